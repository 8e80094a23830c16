//! Streaming-data spoofing for a YouTube client.
//!
//! The host calls four hooks:
//!
//! 1. [`StreamingDataSpoof::on_request_intercepted`] for every outgoing
//!    request. `/player?id=...` starts (or joins) a replacement `/player`
//!    fetch on another client profile and returns immediately.
//! 2. [`StreamingDataSpoof::on_write_intercepted`] drops the now-stale
//!    `videoplayback` POST body.
//! 3. [`StreamingDataSpoof::on_playback_data_needed`] hands back the
//!    replacement payload if the fetch already finished. Never blocks.
//! 4. [`StreamingDataSpoof::on_format_label`] tags the stats overlay with the
//!    client profile that served the video.
//!
//! Anything that goes wrong falls back to the host's original data.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod extract;
pub mod gate;
pub mod innertube;
pub mod label;
pub mod spoof;
pub mod store;
pub mod substitute;

pub use config::{LiveSettings, Settings, SettingsSource};
pub use coordinator::FetchCoordinator;
pub use error::{ConfigError, FetchError, SpoofError};
pub use extract::{Classification, IdentifierExtractor};
pub use innertube::{FetchedStream, InnerTubeFetcher, ReplacementFetcher};
pub use spoof::StreamingDataSpoof;
pub use store::{FetchOutcome, FetchTask, ResultStore, TaskState};
pub use substitute::{LatencySensitiveGuard, PlaybackSubstitutor};
