//! Playback-time lookup of a replacement payload.
//!
//! Called when the host needs the actual streaming data for a video, possibly
//! from a thread that must never wait (the host's UI/main thread). A lookup
//! is one store read plus one atomic load of the task's outcome; if the fetch
//! has not finished the answer is the payload of the completed fetch it
//! replaced, if any, and otherwise "no substitution".

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;

use crate::config::SettingsSource;
use crate::store::{FetchOutcome, ResultStore};

// ---------------------------------------------------------------------------
// Latency-sensitive thread marker
// ---------------------------------------------------------------------------

thread_local! {
    static LATENCY_SENSITIVE: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as latency-sensitive until dropped.
///
/// Only used for diagnostics: lookups behave the same either way.
pub struct LatencySensitiveGuard {
    previous: bool,
    // Must be dropped on the thread that created it.
    _not_send: PhantomData<*const ()>,
}

impl LatencySensitiveGuard {
    pub fn enter() -> Self {
        let previous = LATENCY_SENSITIVE.with(|flag| flag.replace(true));
        Self {
            previous,
            _not_send: PhantomData,
        }
    }
}

impl Drop for LatencySensitiveGuard {
    fn drop(&mut self) {
        LATENCY_SENSITIVE.with(|flag| flag.set(self.previous));
    }
}

pub fn is_latency_sensitive() -> bool {
    LATENCY_SENSITIVE.with(Cell::get)
}

// ---------------------------------------------------------------------------
// Substitutor
// ---------------------------------------------------------------------------

pub struct PlaybackSubstitutor {
    store: Arc<ResultStore>,
    settings: Arc<dyn SettingsSource>,
}

impl PlaybackSubstitutor {
    pub fn new(store: Arc<ResultStore>, settings: Arc<dyn SettingsSource>) -> Self {
        Self { store, settings }
    }

    /// Replacement payload for `video_id`, or `None` to keep the original
    /// streaming data. Never blocks.
    pub fn payload_for(&self, video_id: &str) -> Option<Bytes> {
        let Some(task) = self.store.try_get(video_id) else {
            tracing::debug!("[substitute] no fetch for {}", video_id);
            return None;
        };

        match task.outcome() {
            Some(FetchOutcome::Ready { payload, source }) => {
                tracing::debug!("[substitute] overriding streaming data for {} ({})", video_id, source);
                Some(payload.clone())
            }
            Some(FetchOutcome::Failed { reason }) => {
                tracing::debug!("[substitute] not overriding {}: fetch failed ({})", video_id, reason);
                None
            }
            None => {
                if self.settings.debug_logging() && is_latency_sensitive() {
                    tracing::error!(
                        "[substitute] {} still pending on a latency-sensitive thread; waiting here would block it",
                        video_id
                    );
                }
                match task.fallback() {
                    Some(previous) => {
                        tracing::debug!("[substitute] {} refetch pending, serving previous payload", video_id);
                        Some(previous.clone())
                    }
                    None => {
                        tracing::debug!("[substitute] not overriding {}: fetch pending", video_id);
                        None
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
