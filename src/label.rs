//! "Stats for nerds" marker naming the client profile that served the video.

use std::sync::Arc;

use crate::config::SettingsSource;
use crate::store::ResultStore;

/// U+202D LEFT-TO-RIGHT OVERRIDE. Keeps the format string laid out the same
/// way in RTL locales as the player's time/length text.
const LTR_OVERRIDE: char = '\u{202D}';
const THIN_SPACE: char = '\u{2009}';

pub struct LabelAnnotator {
    store: Arc<ResultStore>,
    settings: Arc<dyn SettingsSource>,
}

impl LabelAnnotator {
    pub fn new(store: Arc<ResultStore>, settings: Arc<dyn SettingsSource>) -> Self {
        Self { store, settings }
    }

    /// `720p` becomes `\u{202D}720p\u{2009}(IOS)`. Anything unmet returns the
    /// label untouched.
    pub fn annotate(&self, label: &str) -> String {
        if label.is_empty()
            || !self.settings.spoofing_enabled()
            || !self.settings.stats_label_enabled()
        {
            return label.to_owned();
        }

        match self.store.last_source() {
            Some(source) => format!("{LTR_OVERRIDE}{label}{THIN_SPACE}({source})"),
            None => {
                tracing::debug!("[label] no successful fetch yet, label unchanged");
                label.to_owned()
            }
        }
    }
}
