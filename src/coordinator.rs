//! At most one in-flight replacement fetch per video id.
//!
//! `begin_fetch` does a single check-and-install on the store and hands the
//! network work to the runtime; it never waits for the fetch. The spawned
//! worker is the only writer of its task's outcome.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use tokio::runtime::Handle;

use crate::error::{Result, SpoofError};
use crate::innertube::ReplacementFetcher;
use crate::store::{FetchOutcome, FetchTask, ResultStore, Slot};

pub struct FetchCoordinator {
    store: Arc<ResultStore>,
    fetcher: Arc<dyn ReplacementFetcher>,
    runtime: Handle,
    dispatched: AtomicU64,
}

impl FetchCoordinator {
    pub fn new(store: Arc<ResultStore>, fetcher: Arc<dyn ReplacementFetcher>, runtime: Handle) -> Self {
        Self {
            store,
            fetcher,
            runtime,
            dispatched: AtomicU64::new(0),
        }
    }

    /// Build on the runtime of the calling context.
    pub fn on_current_runtime(
        store: Arc<ResultStore>,
        fetcher: Arc<dyn ReplacementFetcher>,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| SpoofError::NoRuntime)?;
        Ok(Self::new(store, fetcher, runtime))
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    /// Number of fetches handed to the fetcher so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Start a replacement fetch for `video_id`, or join the one already
    /// pending. Returns the task handle either way; readers may poll it.
    pub fn begin_fetch(&self, video_id: &str, headers: &HeaderMap) -> Result<Arc<FetchTask>> {
        if video_id.is_empty() {
            return Err(SpoofError::EmptyIdentifier);
        }

        match self
            .store
            .join_or_install(video_id, || FetchTask::new(video_id, headers.clone()))
        {
            Slot::Joined(task) => {
                tracing::debug!(
                    "[fetch] {} already pending (gen {}), joining",
                    video_id,
                    task.generation()
                );
                Ok(task)
            }
            Slot::Installed(task) => {
                self.dispatch(Arc::clone(&task));
                Ok(task)
            }
        }
    }

    fn dispatch(&self, task: Arc<FetchTask>) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        tracing::info!("[fetch] {} dispatched (gen {})", task.video_id(), task.generation());

        let fetcher = Arc::clone(&self.fetcher);
        let store = Arc::clone(&self.store);
        let runtime = self.runtime.clone();
        self.runtime.spawn(run_fetch(runtime, fetcher, store, task));
    }
}

async fn run_fetch(
    runtime: Handle,
    fetcher: Arc<dyn ReplacementFetcher>,
    store: Arc<ResultStore>,
    task: Arc<FetchTask>,
) {
    // Run the fetch in its own task so a panicking fetcher still settles
    // this one as failed.
    let worker = {
        let task = Arc::clone(&task);
        runtime.spawn(async move { fetcher.fetch(task.video_id(), task.headers()).await })
    };

    let outcome = match worker.await {
        Ok(Ok(stream)) if stream.payload.is_empty() => FetchOutcome::Failed {
            reason: format!("empty payload from {}", stream.source),
        },
        Ok(Ok(stream)) => FetchOutcome::Ready {
            payload: stream.payload,
            source: stream.source,
        },
        Ok(Err(e)) => FetchOutcome::Failed {
            reason: e.to_string(),
        },
        Err(e) => FetchOutcome::Failed {
            reason: format!("fetch worker aborted: {e}"),
        },
    };

    let source = match &outcome {
        FetchOutcome::Ready { payload, source } => {
            tracing::info!(
                "[fetch] {} ready via {} ({} bytes)",
                task.video_id(),
                source,
                payload.len()
            );
            Some(source.clone())
        }
        FetchOutcome::Failed { reason } => {
            tracing::warn!("[fetch] {} failed: {}", task.video_id(), reason);
            None
        }
    };

    // The payload must be visible before the label names its source.
    task.complete(outcome);

    let current = store
        .get(task.video_id())
        .is_some_and(|t| Arc::ptr_eq(&t, &task));
    if !current {
        tracing::debug!(
            "[fetch] {} (gen {}) superseded or evicted, result not visible",
            task.video_id(),
            task.generation()
        );
    } else if let Some(source) = source {
        store.record_source(&source);
    }
}

/// Poll `task` until it leaves the pending state or `timeout` passes.
/// Returns whether it settled. Meant for callers that are allowed to wait.
pub async fn wait_settled(task: &FetchTask, timeout: Duration) -> bool {
    let poll = Duration::from_millis(10);
    let deadline = tokio::time::Instant::now() + timeout;
    while task.is_pending() {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(poll).await;
    }
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
