//! Error samples - boundary failures written to disk for later triage
//!
//! Caught panics and component-boundary failures become JSON sample
//! files under `<finger-home>/logs/errorsamples/`. Writing is
//! best-effort: a failed write is logged and swallowed.

use finger_core::SharedClock;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::warn;

/// Error sample format version
pub const ERROR_SAMPLE_VERSION: u32 = 1;

/// Appends error samples under the finger home
pub struct ErrorSampleWriter {
    dir: PathBuf,
    clock: SharedClock,
}

impl ErrorSampleWriter {
    /// Writer rooted at `<finger-home>/logs/errorsamples/`
    pub fn new(finger_home: impl Into<PathBuf>, clock: SharedClock) -> Self {
        Self {
            dir: finger_home.into().join("logs").join("errorsamples"),
            clock,
        }
    }

    /// Write one sample; best-effort
    pub fn write(&self, component: &str, message: &str, context: Value) {
        let sample = json!({
            "version": ERROR_SAMPLE_VERSION,
            "timestamp": self.clock.now(),
            "component": component,
            "message": message,
            "context": context,
        });
        if let Err(err) = self.try_write(component, &sample) {
            warn!("failed to write error sample for {}: {}", component, err);
        }
    }

    fn try_write(&self, component: &str, sample: &Value) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let name = format!(
            "{}-{}.json",
            self.clock.now_millis(),
            component.replace(|c: char| !c.is_ascii_alphanumeric(), "-")
        );
        std::fs::write(self.dir.join(name), serde_json::to_vec_pretty(sample)?)
    }
}
