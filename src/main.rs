use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;
use tracing_subscriber::EnvFilter;

use ytspoof_lite::coordinator::wait_settled;
use ytspoof_lite::innertube::header_map;
use ytspoof_lite::{LiveSettings, Settings, StreamingDataSpoof};

const DEFAULT_LABEL: &str = "1080p60";
const DEFAULT_WAIT_SECS: u64 = 20;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Drive one interception end to end, the way a host would:
///
///   ytspoof-lite <player-url> [format-label]
///
/// `YTSPOOF_AUTHORIZATION` / `YTSPOOF_VISITOR_ID` stand in for the headers
/// the host's intercepted request would carry.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // 1. Init logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 2. Args
    let mut args = std::env::args().skip(1);
    let Some(url) = args.next() else {
        eprintln!("usage: ytspoof-lite <player-url> [format-label]");
        std::process::exit(2);
    };
    let label = args.next().unwrap_or_else(|| DEFAULT_LABEL.into());
    let wait = Duration::from_secs(
        std::env::var("YTSPOOF_WAIT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_WAIT_SECS),
    );

    // 3. Load settings (file + env overrides)
    let settings = Settings::load()?;
    let flags = Arc::new(LiveSettings::from_settings(&settings));

    // 4. Build the pipeline
    let http = reqwest::Client::builder().build()?;
    let spoof = StreamingDataSpoof::from_settings(
        &settings,
        flags,
        http,
        tokio::runtime::Handle::current(),
    )?;

    if !spoof.is_spoofing_enabled() {
        tracing::info!("[main] spoofing disabled in settings, nothing to do");
        return Ok(());
    }

    // 5. Intercept
    let authorization = std::env::var("YTSPOOF_AUTHORIZATION").unwrap_or_default();
    let visitor_id = std::env::var("YTSPOOF_VISITOR_ID").unwrap_or_default();
    let headers = header_map(
        [
            ("Authorization", authorization.as_str()),
            ("X-Goog-Visitor-Id", visitor_id.as_str()),
        ]
        .into_iter()
        .filter(|(_, v)| !v.is_empty()),
    );

    let task = match spoof.try_intercept(&url, &headers) {
        Ok(Some(task)) => task,
        Ok(None) => {
            println!("not a player request, passed through: {url}");
            return Ok(());
        }
        Err(e) => {
            println!("request passed through unmodified: {e}");
            return Ok(());
        }
    };

    // 6. Wait for the fetch. Only the demo waits; host hooks never do.
    if !wait_settled(&task, wait).await {
        tracing::warn!("[main] fetch for {} still pending after {:?}", task.video_id(), wait);
    }

    // 7. Report what each hook would answer
    match spoof.on_playback_data_needed(task.video_id()) {
        Some(payload) => println!("{}: replacement streaming data, {} bytes", task.video_id(), payload.len()),
        None => println!("{}: no replacement, original streaming data kept", task.video_id()),
    }
    println!("label: {}", spoof.on_format_label(&label));

    let body = spoof.on_write_intercepted(&Method::POST, "/videoplayback", Bytes::from_static(b"\x00"));
    println!("videoplayback POST body: {}", if body.is_some() { "kept" } else { "dropped" });

    spoof.shutdown();
    Ok(())
}
