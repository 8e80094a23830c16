//! Keyed store of replacement fetches.
//!
//! One current [`FetchTask`] per video id. The map is a sharded `DashMap`
//! whose shard locks only ever guard in-memory map operations, so a lookup
//! never waits on I/O. Completion is a write-once cell inside the task:
//! the fetch worker sets it exactly once and readers observe it with a
//! single atomic load.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::try_result::TryResult;
use dashmap::DashMap;
use reqwest::header::HeaderMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::Settings;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// A pending task younger than this is always joined, whatever the ttl.
pub const MIN_PENDING_LIFETIME: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Fetch task
// ---------------------------------------------------------------------------

/// Terminal result of one replacement fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Ready { payload: Bytes, source: String },
    Failed { reason: String },
}

/// Read-only snapshot of a task, as seen by readers.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Pending,
    Ready { payload: Bytes, source: String },
    Failed { reason: String },
}

/// One in-flight or completed replacement fetch for a video id.
#[derive(Debug)]
pub struct FetchTask {
    video_id: String,
    generation: u64,
    headers: HeaderMap,
    created_at: Instant,
    outcome: OnceLock<FetchOutcome>,
    /// Payload of the completed task this one replaced, served while pending.
    fallback: Option<Bytes>,
}

impl FetchTask {
    pub fn new(video_id: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            video_id: video_id.into(),
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            headers,
            created_at: Instant::now(),
            outcome: OnceLock::new(),
            fallback: None,
        }
    }

    fn with_fallback(mut self, fallback: Option<Bytes>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// Monotonic across all tasks; a newer task for the same id has a
    /// higher generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Headers of the intercepted request, captured when the task was created.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn is_pending(&self) -> bool {
        self.outcome.get().is_none()
    }

    pub fn outcome(&self) -> Option<&FetchOutcome> {
        self.outcome.get()
    }

    pub fn state(&self) -> TaskState {
        match self.outcome.get() {
            None => TaskState::Pending,
            Some(FetchOutcome::Ready { payload, source }) => TaskState::Ready {
                payload: payload.clone(),
                source: source.clone(),
            },
            Some(FetchOutcome::Failed { reason }) => TaskState::Failed {
                reason: reason.clone(),
            },
        }
    }

    /// Payload if the fetch completed successfully.
    pub fn payload(&self) -> Option<Bytes> {
        match self.outcome.get() {
            Some(FetchOutcome::Ready { payload, .. }) => Some(payload.clone()),
            _ => None,
        }
    }

    /// What a reader may substitute right now: the own payload once ready,
    /// the replaced task's payload while still pending, nothing on failure.
    pub fn visible_payload(&self) -> Option<Bytes> {
        match self.outcome.get() {
            Some(FetchOutcome::Ready { payload, .. }) => Some(payload.clone()),
            Some(FetchOutcome::Failed { .. }) => None,
            None => self.fallback.clone(),
        }
    }

    pub fn fallback(&self) -> Option<&Bytes> {
        self.fallback.as_ref()
    }

    /// Record the terminal outcome. Only the task's own fetch worker calls
    /// this, and only once.
    pub(crate) fn complete(&self, outcome: FetchOutcome) -> bool {
        let first = self.outcome.set(outcome).is_ok();
        if !first {
            tracing::error!(
                "[store] task {} (gen {}) completed twice",
                self.video_id,
                self.generation
            );
        }
        debug_assert!(first, "fetch task completed twice");
        first
    }
}

// ---------------------------------------------------------------------------
// Result store
// ---------------------------------------------------------------------------

/// Result of asking the store for a task slot.
#[derive(Debug)]
pub enum Slot {
    /// A pending task already exists; share it.
    Joined(Arc<FetchTask>),
    /// A new task was installed, replacing any terminal or stale one.
    Installed(Arc<FetchTask>),
}

impl Slot {
    pub fn task(&self) -> &Arc<FetchTask> {
        match self {
            Slot::Joined(task) | Slot::Installed(task) => task,
        }
    }
}

pub struct ResultStore {
    entries: DashMap<String, Arc<FetchTask>>,
    capacity: usize,
    ttl: Duration,
    pending_lifetime: Duration,
    last_source: RwLock<Option<String>>,
}

impl ResultStore {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
            ttl,
            pending_lifetime: ttl.max(MIN_PENDING_LIFETIME),
            last_source: RwLock::new(None),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.store_capacity, settings.store_ttl())
    }

    /// Current task for `video_id`, if any. Never waits on a fetch.
    pub fn get(&self, video_id: &str) -> Option<Arc<FetchTask>> {
        self.entries.get(video_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Like [`Self::get`], but a shard that is write-locked right now reads
    /// as absent instead of being waited on.
    pub fn try_get(&self, video_id: &str) -> Option<Arc<FetchTask>> {
        match self.entries.try_get(video_id) {
            TryResult::Present(entry) => Some(Arc::clone(entry.value())),
            TryResult::Absent => None,
            TryResult::Locked => {
                tracing::debug!("[store] shard busy, {} read as absent", video_id);
                None
            }
        }
    }

    /// Install `task`, replacing whatever was stored for its id.
    pub fn put(&self, task: Arc<FetchTask>) -> Option<Arc<FetchTask>> {
        let previous = self.entries.insert(task.video_id().to_owned(), task);
        self.evict_over_capacity();
        previous
    }

    /// Join a pending task for `video_id`, or install a fresh one built by
    /// `make`. A pending task older than the pending lifetime (the ttl, but
    /// never less than [`MIN_PENDING_LIFETIME`]) counts as stale and is
    /// replaced. A replaced task's payload is carried into the new one.
    pub fn join_or_install(
        &self,
        video_id: &str,
        make: impl FnOnce() -> FetchTask,
    ) -> Slot {
        let installed = match self.entries.entry(video_id.to_owned()) {
            Entry::Occupied(mut slot) => {
                let current = slot.get();
                if current.is_pending() && current.age() <= self.pending_lifetime {
                    return Slot::Joined(Arc::clone(current));
                }
                let task = Arc::new(make().with_fallback(current.visible_payload()));
                slot.insert(Arc::clone(&task));
                task
            }
            Entry::Vacant(slot) => {
                let task = Arc::new(make());
                slot.insert(Arc::clone(&task));
                task
            }
        };

        self.evict_over_capacity();
        Slot::Installed(installed)
    }

    pub fn remove(&self, video_id: &str) -> Option<Arc<FetchTask>> {
        self.entries.remove(video_id).map(|(_, task)| task)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop completed entries older than the ttl and pending ones older than
    /// the pending lifetime. A dropped pending task keeps running; its result
    /// is just never seen.
    pub fn sweep_expired(&self) -> usize {
        let before = self.entries.len();
        let (ttl, pending_lifetime) = (self.ttl, self.pending_lifetime);
        self.entries.retain(|_, task| {
            let limit = if task.is_pending() { pending_lifetime } else { ttl };
            task.age() <= limit
        });
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!("[store] swept {} expired entries", removed);
        }
        removed
    }

    /// Remove everything, e.g. at session end.
    pub fn clear(&self) {
        self.entries.clear();
        *self.last_source.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Source label of the most recent successful fetch.
    pub fn last_source(&self) -> Option<String> {
        self.last_source
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn record_source(&self, source: &str) {
        *self.last_source.write().unwrap_or_else(|e| e.into_inner()) = Some(source.to_owned());
    }

    /// Periodically sweep expired entries until `shutdown` flips to true or
    /// its sender is dropped.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        handle: &tokio::runtime::Handle,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        store.sweep_expired();
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("[store] sweeper stopped");
        })
    }

    fn evict_over_capacity(&self) {
        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().generation())
                .map(|entry| entry.key().clone());

            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                    tracing::debug!("[store] evicted {}", key);
                }
                None => break,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
