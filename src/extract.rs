//! Classifies intercepted request URLs.
//!
//! Only `/player` requests carry the video id a replacement fetch is keyed
//! by. `heartbeat` and `refresh` variants also live under the player path but
//! have no stable id: heartbeat fires after playback has started, refresh
//! while waiting on a live stream to begin.

use reqwest::Url;

use crate::error::{Result, SpoofError};

const PLAYER_SEGMENT: &str = "player";
const IGNORED_VARIANTS: &[&str] = &["heartbeat", "refresh"];
const VIDEO_ID_PARAM: &str = "id";

/// Outcome of looking at one intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// A player request; fetch a replacement keyed by this video id.
    Fetch(String),
    /// Anything else. The request proceeds untouched.
    Ignore,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentifierExtractor;

impl IdentifierExtractor {
    /// Classify a request URL.
    ///
    /// A player request without an `id` query parameter is an error so the
    /// caller can log it; it is still treated as "not applicable".
    pub fn classify(&self, url: &str) -> Result<Classification> {
        let parsed = Url::parse(url).map_err(|e| SpoofError::InvalidUrl {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;

        if !is_player_path(parsed.path()) {
            return Ok(Classification::Ignore);
        }
        tracing::debug!("[extract] player request {}", parsed.path());

        match parsed
            .query_pairs()
            .find(|(k, _)| k == VIDEO_ID_PARAM)
            .map(|(_, v)| v.into_owned())
        {
            Some(id) if !id.is_empty() => Ok(Classification::Fetch(id)),
            _ => Err(SpoofError::MissingVideoId {
                url: url.to_owned(),
            }),
        }
    }
}

fn is_player_path(path: &str) -> bool {
    path.contains(PLAYER_SEGMENT) && !IGNORED_VARIANTS.iter().any(|v| path.contains(v))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::player("https://youtubei.googleapis.com/youtubei/v1/player?id=ABC123", "ABC123")]
    #[case::extra_params("https://www.youtube.com/youtubei/v1/player?key=k&id=dQw4w9WgXcQ&t=1", "dQw4w9WgXcQ")]
    #[case::encoded("https://www.youtube.com/youtubei/v1/player?id=a%2Db", "a-b")]
    fn test_player_request_is_fetch_worthy(#[case] url: &str, #[case] expected: &str) {
        assert_eq!(
            IdentifierExtractor.classify(url).unwrap(),
            Classification::Fetch(expected.to_owned())
        );
    }

    #[rstest]
    #[case::heartbeat("https://www.youtube.com/youtubei/v1/player/heartbeat?id=ABC123")]
    #[case::refresh("https://www.youtube.com/youtubei/v1/player/refresh?id=ABC123")]
    #[case::browse("https://www.youtube.com/youtubei/v1/browse?id=ABC123")]
    #[case::videoplayback("https://rr1---sn.googlevideo.com/videoplayback?id=ABC123")]
    fn test_non_player_requests_are_ignored(#[case] url: &str) {
        assert_eq!(IdentifierExtractor.classify(url).unwrap(), Classification::Ignore);
    }

    #[rstest]
    #[case::absent("https://www.youtube.com/youtubei/v1/player?key=k")]
    #[case::empty("https://www.youtube.com/youtubei/v1/player?id=")]
    fn test_player_without_id_is_error(#[case] url: &str) {
        assert!(matches!(
            IdentifierExtractor.classify(url),
            Err(SpoofError::MissingVideoId { .. })
        ));
    }

    #[test]
    fn test_unparseable_url_is_error() {
        assert!(matches!(
            IdentifierExtractor.classify("not a url"),
            Err(SpoofError::InvalidUrl { .. })
        ));
    }
}
