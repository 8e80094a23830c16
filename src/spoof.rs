//! Host-facing entry points.
//!
//! Each `on_*` method is one hook the host calls from its own request
//! plumbing. They never return errors: internal failures are logged once
//! here and turned into the pass-through answer for that hook.

use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::Method;
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::config::{Settings, SettingsSource};
use crate::coordinator::FetchCoordinator;
use crate::error::Result;
use crate::extract::{Classification, IdentifierExtractor};
use crate::gate::SideEffectGate;
use crate::innertube::{InnerTubeFetcher, ReplacementFetcher};
use crate::label::LabelAnnotator;
use crate::store::{FetchTask, ResultStore};
use crate::substitute::PlaybackSubstitutor;

pub struct StreamingDataSpoof {
    settings: Arc<dyn SettingsSource>,
    extractor: IdentifierExtractor,
    coordinator: FetchCoordinator,
    substitutor: PlaybackSubstitutor,
    gate: SideEffectGate,
    labels: LabelAnnotator,
    shutdown: watch::Sender<bool>,
}

impl StreamingDataSpoof {
    pub fn new(
        settings: Arc<dyn SettingsSource>,
        store: Arc<ResultStore>,
        fetcher: Arc<dyn ReplacementFetcher>,
        runtime: Handle,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            extractor: IdentifierExtractor,
            coordinator: FetchCoordinator::new(Arc::clone(&store), fetcher, runtime),
            substitutor: PlaybackSubstitutor::new(Arc::clone(&store), Arc::clone(&settings)),
            gate: SideEffectGate::new(Arc::clone(&settings)),
            labels: LabelAnnotator::new(store, Arc::clone(&settings)),
            settings,
            shutdown,
        }
    }

    /// Wire the whole pipeline from persisted settings: InnerTube fetcher,
    /// bounded store, and a background sweeper on `runtime`.
    pub fn from_settings(
        settings: &Settings,
        flags: Arc<dyn SettingsSource>,
        http: reqwest::Client,
        runtime: Handle,
    ) -> Result<Self> {
        let fetcher = InnerTubeFetcher::new(http, &settings.client_profiles, settings.request_timeout())?;
        let store = Arc::new(ResultStore::from_settings(settings));

        let spoof = Self::new(flags, Arc::clone(&store), Arc::new(fetcher), runtime.clone());
        store.spawn_sweeper(&runtime, settings.sweep_interval(), spoof.shutdown.subscribe());

        tracing::info!(
            "[spoof] ready (enabled={}, capacity={}, clients={:?})",
            spoof.settings.spoofing_enabled(),
            settings.store_capacity,
            settings.client_profiles
        );
        Ok(spoof)
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        self.coordinator.store()
    }

    pub fn coordinator(&self) -> &FetchCoordinator {
        &self.coordinator
    }

    pub fn is_spoofing_enabled(&self) -> bool {
        self.settings.spoofing_enabled()
    }

    /// The host's HLS current-time fix is incompatible with replaced
    /// streaming data; force it off while spoofing.
    pub fn fix_hls_current_time(&self, original: bool) -> bool {
        if self.settings.spoofing_enabled() {
            false
        } else {
            original
        }
    }

    // -----------------------------------------------------------------------
    // Hooks
    // -----------------------------------------------------------------------

    /// Outgoing request hook. Fire-and-forget.
    pub fn on_request_intercepted(&self, url: &str, headers: &HeaderMap) {
        if !self.settings.spoofing_enabled() {
            return;
        }

        if let Err(e) = self.try_intercept(url, headers) {
            tracing::error!("[spoof] request interception failed: {}", e);
        }
    }

    /// Playback-data hook. `None` keeps the original streaming data.
    pub fn on_playback_data_needed(&self, video_id: &str) -> Option<Bytes> {
        if !self.settings.spoofing_enabled() {
            return None;
        }
        self.substitutor.payload_for(video_id)
    }

    /// Write hook. `None` tells the host to drop the body.
    pub fn on_write_intercepted(&self, method: &Method, target: &str, body: Bytes) -> Option<Bytes> {
        if self.gate.should_suppress_write(method, target) {
            None
        } else {
            Some(body)
        }
    }

    /// Format-string hook for the stats overlay.
    pub fn on_format_label(&self, label: &str) -> String {
        self.labels.annotate(label)
    }

    /// Stop background work and drop every stored result.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
        self.store().clear();
        tracing::info!("[spoof] shut down");
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Fallible core of [`Self::on_request_intercepted`]. Returns the task
    /// handle when the request was fetch-worthy.
    pub fn try_intercept(&self, url: &str, headers: &HeaderMap) -> Result<Option<Arc<FetchTask>>> {
        match self.extractor.classify(url)? {
            Classification::Fetch(video_id) => {
                let task = self.coordinator.begin_fetch(&video_id, headers)?;
                Ok(Some(task))
            }
            Classification::Ignore => Ok(None),
        }
    }
}

impl Drop for StreamingDataSpoof {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}
