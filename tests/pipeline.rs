use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::Method;
use rstest::rstest;
use tokio::sync::Notify;

use ytspoof_lite::coordinator::wait_settled;
use ytspoof_lite::innertube::{header_map, Result as FetchResult};
use ytspoof_lite::{
    FetchError, FetchedStream, LatencySensitiveGuard, LiveSettings, ReplacementFetcher,
    ResultStore, Settings, StreamingDataSpoof, TaskState,
};

const PLAYER: &str = "https://youtubei.googleapis.com/youtubei/v1/player";

// ---------------------------------------------------------------------------
// Scripted fetcher
// ---------------------------------------------------------------------------

/// Answers per video id; holds every fetch until `release` is called.
#[derive(Default)]
struct ScriptedFetcher {
    answers: Mutex<HashMap<String, Option<(&'static [u8], &'static str)>>>,
    calls: Mutex<Vec<(String, HeaderMap)>>,
    started: AtomicUsize,
    gate: Notify,
    released: std::sync::atomic::AtomicBool,
}

impl ScriptedFetcher {
    fn succeed(&self, id: &str, payload: &'static [u8], source: &'static str) {
        self.answers.lock().unwrap().insert(id.to_owned(), Some((payload, source)));
    }

    fn fail(&self, id: &str) {
        self.answers.lock().unwrap().insert(id.to_owned(), None);
    }

    fn hold(&self) {
        self.released.store(false, Ordering::SeqCst);
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
        self.gate.notify_waiters();
    }

    fn calls_for(&self, id: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(v, _)| v == id).count()
    }
}

#[async_trait]
impl ReplacementFetcher for ScriptedFetcher {
    async fn fetch(&self, video_id: &str, headers: &HeaderMap) -> FetchResult<FetchedStream> {
        self.calls.lock().unwrap().push((video_id.to_owned(), headers.clone()));
        self.started.fetch_add(1, Ordering::SeqCst);

        while !self.released.load(Ordering::SeqCst) {
            let notified = self.gate.notified();
            if self.released.load(Ordering::SeqCst) {
                break;
            }
            notified.await;
        }

        let answer = self.answers.lock().unwrap().get(video_id).cloned();
        match answer {
            Some(Some((payload, source))) => Ok(FetchedStream {
                payload: Bytes::from_static(payload),
                source: source.to_owned(),
            }),
            _ => Err(FetchError::Other(format!("upstream refused {video_id}"))),
        }
    }
}

struct Harness {
    spoof: StreamingDataSpoof,
    settings: Arc<LiveSettings>,
    fetcher: Arc<ScriptedFetcher>,
}

impl Harness {
    async fn settle(&self, id: &str) {
        let task = self.spoof.store().get(id).expect("task installed");
        assert!(wait_settled(&task, Duration::from_secs(5)).await, "fetch for {id} never settled");
    }
}

fn harness() -> Harness {
    harness_with_store(ResultStore::new(16, Duration::from_secs(60)))
}

fn harness_with_store(store: ResultStore) -> Harness {
    let settings = Arc::new(LiveSettings::new(true, true, true));
    let fetcher = Arc::new(ScriptedFetcher::default());
    let spoof = StreamingDataSpoof::new(
        settings.clone(),
        Arc::new(store),
        fetcher.clone(),
        tokio::runtime::Handle::current(),
    );
    Harness {
        spoof,
        settings,
        fetcher,
    }
}

// ---------------------------------------------------------------------------
// End-to-end scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_successful_spoof_end_to_end() {
    let h = harness();
    h.fetcher.succeed("ABC123", b"P", "profile-X");

    h.spoof.on_request_intercepted(&format!("{PLAYER}?id=ABC123"), &HeaderMap::new());
    assert_eq!(h.fetcher.calls_for("ABC123"), 0, "fetch must not run on the caller");
    assert!(h.spoof.on_playback_data_needed("ABC123").is_none());

    h.fetcher.release();
    h.settle("ABC123").await;

    assert_eq!(h.spoof.on_playback_data_needed("ABC123"), Some(Bytes::from_static(b"P")));
    assert_eq!(h.fetcher.calls_for("ABC123"), 1);

    let label = h.spoof.on_format_label("720p");
    assert!(label.starts_with('\u{202D}'));
    assert!(label.contains("720p"));
    assert!(label.contains("profile-X"));
}

#[tokio::test]
async fn test_failed_fetch_falls_back() {
    let h = harness();
    h.fetcher.fail("XYZ999");

    h.spoof.on_request_intercepted(&format!("{PLAYER}?id=XYZ999"), &HeaderMap::new());
    h.fetcher.release();
    h.settle("XYZ999").await;

    assert!(matches!(h.spoof.store().get("XYZ999").unwrap().state(), TaskState::Failed { .. }));
    assert!(h.spoof.on_playback_data_needed("XYZ999").is_none());
    assert_eq!(h.spoof.on_format_label("720p"), "720p");
}

#[tokio::test]
async fn test_disabled_feature_is_inert() {
    let h = harness();
    h.settings.set_spoofing(false);
    h.fetcher.succeed("ABC123", b"P", "profile-X");
    h.fetcher.release();

    h.spoof.on_request_intercepted(&format!("{PLAYER}?id=ABC123"), &HeaderMap::new());
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(h.spoof.store().is_empty());
    assert_eq!(h.fetcher.calls_for("ABC123"), 0);
    assert!(h.spoof.on_playback_data_needed("ABC123").is_none());

    let body = Bytes::from_static(b"sabr request");
    assert_eq!(
        h.spoof.on_write_intercepted(&Method::POST, "https://rr1.googlevideo.com/videoplayback?x=1", body.clone()),
        Some(body)
    );
    assert_eq!(h.spoof.on_format_label("720p"), "720p");
}

#[tokio::test]
async fn test_disabling_after_fetch_hides_payload() {
    let h = harness();
    h.fetcher.succeed("ABC123", b"P", "profile-X");
    h.fetcher.release();

    h.spoof.on_request_intercepted(&format!("{PLAYER}?id=ABC123"), &HeaderMap::new());
    h.settle("ABC123").await;
    assert!(h.spoof.on_playback_data_needed("ABC123").is_some());

    h.settings.set_spoofing(false);
    assert!(h.spoof.on_playback_data_needed("ABC123").is_none());
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_never_fetched_is_absent() {
    let h = harness();
    for id in ["", "ABC123", "dQw4w9WgXcQ"] {
        assert!(h.spoof.on_playback_data_needed(id).is_none());
    }
}

#[tokio::test]
async fn test_duplicate_intercepts_share_one_fetch() {
    let h = harness();
    h.fetcher.succeed("ABC123", b"P", "profile-X");

    let url = format!("{PLAYER}?id=ABC123");
    h.spoof.on_request_intercepted(&url, &HeaderMap::new());
    h.spoof.on_request_intercepted(&url, &HeaderMap::new());
    h.spoof.on_request_intercepted(&url, &HeaderMap::new());

    h.fetcher.release();
    h.settle("ABC123").await;

    assert_eq!(h.spoof.coordinator().dispatched(), 1);
    assert_eq!(h.fetcher.calls_for("ABC123"), 1);
}

#[tokio::test]
async fn test_completed_payload_is_stable_until_refetch() {
    let h = harness();
    h.fetcher.succeed("ABC123", b"first", "IOS");
    h.fetcher.release();

    let url = format!("{PLAYER}?id=ABC123");
    h.spoof.on_request_intercepted(&url, &HeaderMap::new());
    h.settle("ABC123").await;

    for _ in 0..5 {
        assert_eq!(h.spoof.on_playback_data_needed("ABC123"), Some(Bytes::from_static(b"first")));
    }

    h.fetcher.hold();
    h.fetcher.succeed("ABC123", b"second", "TVHTML5");
    h.spoof.on_request_intercepted(&url, &HeaderMap::new());
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(h.spoof.store().get("ABC123").unwrap().is_pending());
    assert_eq!(h.spoof.on_playback_data_needed("ABC123"), Some(Bytes::from_static(b"first")));

    h.fetcher.release();
    h.settle("ABC123").await;

    assert_eq!(h.spoof.on_playback_data_needed("ABC123"), Some(Bytes::from_static(b"second")));
    assert_eq!(h.fetcher.calls_for("ABC123"), 2);
    assert!(h.spoof.on_format_label("720p").contains("TVHTML5"));
}

#[tokio::test]
async fn test_zero_ttl_setting_keeps_single_fetch() {
    let settings: Settings = serde_json::from_str(r#"{"store_ttl_secs": 0}"#).unwrap();
    let h = harness_with_store(ResultStore::from_settings(&settings));
    h.fetcher.succeed("ABC123", b"P", "profile-X");

    let url = format!("{PLAYER}?id=ABC123");
    h.spoof.on_request_intercepted(&url, &HeaderMap::new());
    tokio::time::sleep(Duration::from_millis(2)).await;
    h.spoof.on_request_intercepted(&url, &HeaderMap::new());

    assert_eq!(h.spoof.coordinator().dispatched(), 1);

    h.fetcher.release();
    h.settle("ABC123").await;
    assert_eq!(h.fetcher.calls_for("ABC123"), 1);
}

#[rstest]
#[case::heartbeat("https://www.youtube.com/youtubei/v1/player/heartbeat?id=ABC123")]
#[case::refresh("https://www.youtube.com/youtubei/v1/player/refresh?id=ABC123")]
#[case::missing_id("https://www.youtube.com/youtubei/v1/player?alt=proto")]
#[case::not_a_url("::::")]
#[tokio::test]
async fn test_non_fetch_worthy_requests_start_nothing(#[case] url: &str) {
    let h = harness();
    h.fetcher.release();

    h.spoof.on_request_intercepted(url, &HeaderMap::new());
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(h.spoof.store().is_empty());
    assert_eq!(h.fetcher.started.load(Ordering::SeqCst), 0);
}

#[rstest]
#[case::empty(Bytes::new())]
#[case::proto(Bytes::from_static(b"\x08\x96\x01"))]
#[tokio::test]
async fn test_videoplayback_post_dropped_regardless_of_fetch_state(#[case] body: Bytes) {
    let h = harness();

    let target = "https://rr3---sn-a5mekn6s.googlevideo.com/videoplayback?expire=1&rn=2";
    assert!(h.spoof.on_write_intercepted(&Method::POST, target, body.clone()).is_none());

    h.fetcher.fail("ABC123");
    h.fetcher.release();
    h.spoof.on_request_intercepted(&format!("{PLAYER}?id=ABC123"), &HeaderMap::new());
    h.settle("ABC123").await;
    assert!(h.spoof.on_write_intercepted(&Method::POST, target, body.clone()).is_none());

    assert_eq!(h.spoof.on_write_intercepted(&Method::GET, target, body.clone()), Some(body));
}

#[tokio::test]
async fn test_pending_lookup_from_latency_sensitive_thread() {
    let h = harness();
    h.fetcher.succeed("ABC123", b"P", "profile-X");
    h.spoof.on_request_intercepted(&format!("{PLAYER}?id=ABC123"), &HeaderMap::new());

    let store = Arc::clone(h.spoof.store());
    let seen = std::thread::spawn(move || {
        let _guard = LatencySensitiveGuard::enter();
        store.get("ABC123").map(|t| t.state())
    })
    .join()
    .unwrap();
    assert_eq!(seen, Some(TaskState::Pending));
    assert!(h.spoof.on_playback_data_needed("ABC123").is_none());

    h.fetcher.release();
    h.settle("ABC123").await;
    assert!(h.spoof.on_playback_data_needed("ABC123").is_some());
}

#[tokio::test]
async fn test_request_headers_snapshot_reaches_fetcher() {
    let h = harness();
    h.fetcher.succeed("ABC123", b"P", "profile-X");
    h.fetcher.release();

    let headers = header_map([("Authorization", "Bearer token"), ("X-Goog-Visitor-Id", "CgtW")]);
    h.spoof.on_request_intercepted(&format!("{PLAYER}?id=ABC123"), &headers);
    h.settle("ABC123").await;

    let calls = h.fetcher.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1["authorization"], "Bearer token");
    assert_eq!(calls[0].1["x-goog-visitor-id"], "CgtW");
}
