use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use crate::error::ConfigError;

pub type Result<T> = std::result::Result<T, ConfigError>;

const CONFIG_FILE: &str = "ytspoof-lite.json";

// ---------------------------------------------------------------------------
// Runtime flags
// ---------------------------------------------------------------------------

/// Read-only view of the user toggles the pipeline consults.
///
/// Implementations may change between calls; components re-read on every
/// call instead of caching the answer.
pub trait SettingsSource: Send + Sync {
    /// Master switch for streaming-data spoofing.
    fn spoofing_enabled(&self) -> bool;

    /// "Stats for nerds" label annotation.
    fn stats_label_enabled(&self) -> bool;

    /// Enables extra diagnostics such as the latency-sensitive thread check.
    fn debug_logging(&self) -> bool {
        false
    }
}

/// Toggles that can be flipped at runtime from any thread.
#[derive(Debug, Default)]
pub struct LiveSettings {
    spoof_streaming_data: AtomicBool,
    stats_for_nerds: AtomicBool,
    debug_logging: AtomicBool,
}

impl LiveSettings {
    pub fn new(spoof: bool, stats: bool, debug: bool) -> Self {
        Self {
            spoof_streaming_data: AtomicBool::new(spoof),
            stats_for_nerds: AtomicBool::new(stats),
            debug_logging: AtomicBool::new(debug),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.spoof_streaming_data,
            settings.stats_for_nerds,
            settings.debug_logging,
        )
    }

    pub fn set_spoofing(&self, enabled: bool) {
        self.spoof_streaming_data.store(enabled, Ordering::Release);
    }

    pub fn set_stats_label(&self, enabled: bool) {
        self.stats_for_nerds.store(enabled, Ordering::Release);
    }

    pub fn set_debug_logging(&self, enabled: bool) {
        self.debug_logging.store(enabled, Ordering::Release);
    }
}

impl SettingsSource for LiveSettings {
    fn spoofing_enabled(&self) -> bool {
        self.spoof_streaming_data.load(Ordering::Acquire)
    }

    fn stats_label_enabled(&self) -> bool {
        self.stats_for_nerds.load(Ordering::Acquire)
    }

    fn debug_logging(&self) -> bool {
        self.debug_logging.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Persisted settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub spoof_streaming_data: bool,
    pub stats_for_nerds: bool,
    pub debug_logging: bool,
    /// Maximum number of identifiers kept in the result store.
    pub store_capacity: usize,
    /// Age after which a stored fetch is swept.
    pub store_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// InnerTube client profiles tried in order by the replacement fetch.
    pub client_profiles: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            spoof_streaming_data: true,
            stats_for_nerds: true,
            debug_logging: false,
            store_capacity: 50,
            store_ttl_secs: 10 * 60,
            sweep_interval_secs: 60,
            client_profiles: vec![
                "IOS".to_owned(),
                "ANDROID_VR".to_owned(),
                "ANDROID".to_owned(),
                "TV".to_owned(),
            ],
            request_timeout_secs: 10,
        }
    }
}

impl Settings {
    /// Load settings from the default location, creating the file with
    /// defaults if it does not exist. Environment overrides are applied on top.
    pub fn load() -> Result<Self> {
        let mut settings = Self::load_from(&Self::path()?)?;
        settings.apply_env();
        Ok(settings)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(data) => {
                let settings: Settings = serde_json::from_str(&data)?;
                tracing::info!("[config] loaded settings from {}", path.display());
                Ok(settings)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let settings = Settings::default();
                settings.save_to(path)?;
                tracing::info!("[config] created default settings at {}", path.display());
                Ok(settings)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    /// Write atomically: temp file, then rename over the target.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// `~/.config/ytspoof-lite.json`
    pub fn path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join(CONFIG_FILE))
    }

    /// Apply `YTSPOOF_ENABLED`, `YTSPOOF_STATS_FOR_NERDS` and `YTSPOOF_DEBUG`.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let flag = |key: &str| lookup(key).and_then(|v| parse_flag(&v));

        if let Some(v) = flag("YTSPOOF_ENABLED") {
            self.spoof_streaming_data = v;
        }
        if let Some(v) = flag("YTSPOOF_STATS_FOR_NERDS") {
            self.stats_for_nerds = v;
        }
        if let Some(v) = flag("YTSPOOF_DEBUG") {
            self.debug_logging = v;
        }
    }

    pub fn store_ttl(&self) -> Duration {
        Duration::from_secs(self.store_ttl_secs.max(1))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl SettingsSource for Settings {
    fn spoofing_enabled(&self) -> bool {
        self.spoof_streaming_data
    }

    fn stats_label_enabled(&self) -> bool {
        self.stats_for_nerds
    }

    fn debug_logging(&self) -> bool {
        self.debug_logging
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
