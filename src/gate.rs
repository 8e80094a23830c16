//! Drops the host's own `videoplayback` POST body once spoofing is on.
//!
//! With replacement streaming data in place, the original client's
//! videoplayback write is stale. The decision depends only on method and
//! path, never on whether the matching fetch succeeded.

use std::sync::Arc;

use reqwest::{Method, Url};

use crate::config::SettingsSource;

const PLAYBACK_WRITE_SEGMENT: &str = "videoplayback";

pub struct SideEffectGate {
    settings: Arc<dyn SettingsSource>,
}

impl SideEffectGate {
    pub fn new(settings: Arc<dyn SettingsSource>) -> Self {
        Self { settings }
    }

    /// `target` may be a full URL or just its path.
    pub fn should_suppress_write(&self, method: &Method, target: &str) -> bool {
        if !self.settings.spoofing_enabled() || method != Method::POST {
            return false;
        }

        let suppress = request_path(target).contains(PLAYBACK_WRITE_SEGMENT);
        if suppress {
            tracing::debug!("[gate] dropping {} body for {}", method, target);
        }
        suppress
    }
}

fn request_path(target: &str) -> String {
    match Url::parse(target) {
        Ok(url) => url.path().to_owned(),
        Err(_) => target
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
