use thiserror::Error;

// ---------------------------------------------------------------------------
// Pipeline errors
// ---------------------------------------------------------------------------

pub type Result<T> = std::result::Result<T, SpoofError>;

/// Errors raised inside the interception pipeline.
///
/// None of these ever cross a host boundary: `StreamingDataSpoof` turns each
/// one into the pass-through fallback for that boundary.
#[derive(Debug, Error)]
pub enum SpoofError {
    #[error("invalid request url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("player request has no video id: {url}")]
    MissingVideoId { url: String },

    #[error("empty content identifier")]
    EmptyIdentifier,

    #[error("no tokio runtime available to schedule fetches")]
    NoRuntime,

    #[error("replacement fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

// ---------------------------------------------------------------------------
// Fetch errors
// ---------------------------------------------------------------------------

/// Failure of the replacement fetch collaborator.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("innertube http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("innertube /player returned HTTP {status} for client {client}")]
    Status {
        client: String,
        status: reqwest::StatusCode,
    },

    #[error("video {video_id} not playable with {client}: {status} ({reason})")]
    Unplayable {
        video_id: String,
        client: String,
        status: String,
        reason: String,
    },

    #[error("response from {client} carries no streamingData")]
    NoStreamingData { client: String },

    #[error("malformed /player response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("all {attempts} client profiles failed for {video_id}")]
    AllClientsFailed { video_id: String, attempts: usize },

    #[error("unknown client profile {0:?}")]
    UnknownProfile(String),

    #[error("{0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("could not determine config directory")]
    NoConfigDir,
}
