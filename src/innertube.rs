//! Replacement fetch: InnerTube `/player` with alternate client profiles.
//!
//! The intercepted request was made by the host's own client profile. We
//! re-issue `/player` for the same video id as other clients (IOS, VR,
//! ANDROID, TV), in order, and keep the first response that is playable and
//! carries `streamingData`. The raw response body is the payload handed back
//! to the host at playback time.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::FetchError;

const PLAYER_URL: &str = "https://youtubei.googleapis.com/youtubei/v1/player?prettyPrint=false";

/// Headers copied from the intercepted request. Everything else is set per
/// client profile.
const FORWARDED_HEADERS: &[&str] = &[
    "authorization",
    "x-goog-api-format-version",
    "x-goog-visitor-id",
];

pub type Result<T> = std::result::Result<T, FetchError>;

/// A successful replacement fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedStream {
    pub payload: Bytes,
    /// Client profile that produced the payload.
    pub source: String,
}

/// The network side of the pipeline. Any retry or fallback policy lives in
/// the implementation; the coordinator calls `fetch` exactly once per task.
#[async_trait]
pub trait ReplacementFetcher: Send + Sync {
    async fn fetch(&self, video_id: &str, headers: &HeaderMap) -> Result<FetchedStream>;
}

// ---------------------------------------------------------------------------
// InnerTube client profiles
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct InnerTubeClient {
    pub client_name: &'static str,
    pub client_version: &'static str,
    device_make: &'static str,
    device_model: &'static str,
    os_name: &'static str,
    os_version: &'static str,
    user_agent: &'static str,
    client_name_id: i32,
    android_sdk_version: Option<i32>,
}

const IOS_CLIENT: InnerTubeClient = InnerTubeClient {
    client_name: "IOS",
    client_version: "21.02.3",
    device_make: "Apple",
    device_model: "iPhone16,2",
    os_name: "iPhone",
    os_version: "18.1.0.22B83",
    user_agent: "com.google.ios.youtube/21.02.3 (iPhone16,2; U; CPU iOS 18_1_0 like Mac OS X;)",
    client_name_id: 5,
    android_sdk_version: None,
};

const ANDROID_VR_CLIENT: InnerTubeClient = InnerTubeClient {
    client_name: "ANDROID_VR",
    client_version: "1.61.48",
    device_make: "Oculus",
    device_model: "Quest 3",
    os_name: "Android",
    os_version: "12L",
    user_agent: "com.google.android.apps.youtube.vr.oculus/1.61.48 (Linux; U; Android 12L; eureka-user Build/SQ3A.220605.009.A1) gzip",
    client_name_id: 28,
    android_sdk_version: Some(32),
};

const ANDROID_CLIENT: InnerTubeClient = InnerTubeClient {
    client_name: "ANDROID",
    client_version: "19.44.38",
    device_make: "Google",
    device_model: "Pixel 8",
    os_name: "Android",
    os_version: "14",
    user_agent: "com.google.android.youtube/19.44.38 (Linux; U; Android 14; en_US; Pixel 8) gzip",
    client_name_id: 3,
    android_sdk_version: Some(34),
};

/// Living-room TV client.
const TV_CLIENT: InnerTubeClient = InnerTubeClient {
    client_name: "TVHTML5",
    client_version: "7.20250120.19.00",
    device_make: "",
    device_model: "",
    os_name: "",
    os_version: "",
    user_agent: "Mozilla/5.0 (ChromiumStylePlatform) Cobalt/Version",
    client_name_id: 7,
    android_sdk_version: None,
};

/// Map a settings profile name to its client constants.
pub fn client_profile(name: &str) -> Option<&'static InnerTubeClient> {
    match name.to_ascii_uppercase().as_str() {
        "IOS" => Some(&IOS_CLIENT),
        "ANDROID_VR" => Some(&ANDROID_VR_CLIENT),
        "ANDROID" => Some(&ANDROID_CLIENT),
        "TV" | "TVHTML5" => Some(&TV_CLIENT),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

pub struct InnerTubeFetcher {
    http: reqwest::Client,
    clients: Vec<&'static InnerTubeClient>,
    timeout: Duration,
}

impl InnerTubeFetcher {
    /// Build a fetcher that tries `profiles` in order.
    pub fn new(http: reqwest::Client, profiles: &[String], timeout: Duration) -> Result<Self> {
        let clients = profiles
            .iter()
            .map(|name| client_profile(name).ok_or_else(|| FetchError::UnknownProfile(name.clone())))
            .collect::<Result<Vec<_>>>()?;

        if clients.is_empty() {
            return Err(FetchError::Other("no client profiles configured".to_owned()));
        }

        Ok(Self {
            http,
            clients,
            timeout,
        })
    }

    pub fn clients(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.clients.iter().map(|c| c.client_name)
    }

    async fn player(
        &self,
        video_id: &str,
        itclient: &InnerTubeClient,
        forwarded: &HeaderMap,
    ) -> Result<Bytes> {
        let body = serde_json::json!({
            "videoId": video_id,
            "context": build_context(itclient),
            "contentCheckOk": true,
            "racyCheckOk": true,
            "playbackContext": {
                "contentPlaybackContext": {
                    "html5Preference": "HTML5_PREF_WANTS",
                }
            },
        });

        tracing::debug!(
            "[innertube] /player for {} using {} v{}",
            video_id,
            itclient.client_name,
            itclient.client_version
        );

        let resp = self
            .http
            .post(PLAYER_URL)
            .headers(forwarded.clone())
            .header("User-Agent", itclient.user_agent)
            .header("Content-Type", "application/json")
            .header("X-YouTube-Client-Name", itclient.client_name_id.to_string())
            .header("X-YouTube-Client-Version", itclient.client_version)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(FetchError::Status {
                client: itclient.client_name.to_owned(),
                status: resp.status(),
            });
        }

        let bytes = resp.bytes().await?;
        check_player_response(&bytes, video_id, itclient.client_name)?;
        Ok(bytes)
    }
}

#[async_trait]
impl ReplacementFetcher for InnerTubeFetcher {
    async fn fetch(&self, video_id: &str, headers: &HeaderMap) -> Result<FetchedStream> {
        let forwarded = forwarded_headers(headers);

        for itclient in &self.clients {
            match self.player(video_id, itclient, &forwarded).await {
                Ok(payload) => {
                    tracing::info!(
                        "[innertube] {} OK via {} ({} bytes)",
                        video_id,
                        itclient.client_name,
                        payload.len()
                    );
                    return Ok(FetchedStream {
                        payload,
                        source: itclient.client_name.to_owned(),
                    });
                }
                Err(e) => {
                    tracing::warn!("[innertube] {} failed via {}: {}", video_id, itclient.client_name, e);
                }
            }
        }

        Err(FetchError::AllClientsFailed {
            video_id: video_id.to_owned(),
            attempts: self.clients.len(),
        })
    }
}

// ---------------------------------------------------------------------------
// Request / response helpers
// ---------------------------------------------------------------------------

fn build_context(itclient: &InnerTubeClient) -> serde_json::Value {
    let mut client_obj = serde_json::json!({
        "clientName": itclient.client_name,
        "clientVersion": itclient.client_version,
        "hl": "en",
        "gl": "US",
        "timeZone": "UTC",
        "utcOffsetMinutes": 0,
    });

    if !itclient.device_make.is_empty() {
        client_obj["deviceMake"] = serde_json::json!(itclient.device_make);
        client_obj["deviceModel"] = serde_json::json!(itclient.device_model);
        client_obj["osName"] = serde_json::json!(itclient.os_name);
        client_obj["osVersion"] = serde_json::json!(itclient.os_version);
    }

    if let Some(sdk) = itclient.android_sdk_version {
        client_obj["androidSdkVersion"] = serde_json::json!(sdk);
    }

    serde_json::json!({ "client": client_obj })
}

/// Keep only the auth/session headers worth replaying under another client.
fn forwarded_headers(original: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for &name in FORWARDED_HEADERS {
        let name = HeaderName::from_static(name);
        if let Some(value) = original.get(&name) {
            out.insert(name, value.clone());
        }
    }
    out
}

fn check_player_response(body: &[u8], video_id: &str, client: &str) -> Result<()> {
    let json: serde_json::Value = serde_json::from_slice(body)?;

    let status = json["playabilityStatus"]["status"]
        .as_str()
        .unwrap_or("UNKNOWN");
    if status != "OK" {
        return Err(FetchError::Unplayable {
            video_id: video_id.to_owned(),
            client: client.to_owned(),
            status: status.to_owned(),
            reason: json["playabilityStatus"]["reason"]
                .as_str()
                .unwrap_or("unknown reason")
                .to_owned(),
        });
    }

    if !json["streamingData"].is_object() {
        return Err(FetchError::NoStreamingData {
            client: client.to_owned(),
        });
    }

    Ok(())
}

/// Convenience for hosts that hand over headers as plain string pairs.
/// Pairs that are not valid HTTP headers are skipped.
pub fn header_map<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (k, v) in pairs {
        match (HeaderName::try_from(k), HeaderValue::try_from(v)) {
            (Ok(name), Ok(value)) => {
                map.append(name, value);
            }
            _ => tracing::debug!("[innertube] skipping invalid header {:?}", k),
        }
    }
    map
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
