//! Atomic-move detection: wait until a file has stopped changing before
//! touching it, so a half-finished download is never processed.

use std::fs::Metadata;
use std::path::Path;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, warn};

use crate::config::AtomicMoveConfig;
use crate::sanitize::redact_path;

#[derive(Debug, Clone, PartialEq)]
pub struct StabilityConfig {
    pub enabled: bool,
    /// How long size and mtime must stay unchanged.
    pub duration: Duration,
    pub interval: Duration,
    /// Give up on a file that is still changing after this long. `None`
    /// waits for as long as the file keeps changing.
    pub max_wait: Option<Duration>,
}

impl StabilityConfig {
    pub fn from_config(config: &AtomicMoveConfig) -> Self {
        let seconds = |value: f64| Duration::from_secs_f64(value.max(0.0));
        Self {
            enabled: config.enabled,
            duration: seconds(config.duration_seconds),
            interval: seconds(config.check_interval).max(Duration::from_millis(1)),
            max_wait: (config.max_wait_seconds > 0.0).then(|| seconds(config.max_wait_seconds)),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self::from_config(&AtomicMoveConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityVerdict {
    Stable,
    /// The file was still being written when `max_wait` ran out.
    StillChanging,
    /// The file vanished (or became unreadable) while being watched.
    Disappeared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Snapshot {
    len: u64,
    modified: Option<SystemTime>,
}

impl From<&Metadata> for Snapshot {
    fn from(metadata: &Metadata) -> Self {
        Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StabilityDetector {
    config: StabilityConfig,
}

impl StabilityDetector {
    pub fn new(config: StabilityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StabilityConfig {
        &self.config
    }

    pub fn is_stable(&self, path: &Path) -> bool {
        self.check(path) == StabilityVerdict::Stable
    }

    /// Samples size and modification time every `interval`; any change
    /// restarts the quiet window.
    pub fn check(&self, path: &Path) -> StabilityVerdict {
        if !self.config.enabled {
            return StabilityVerdict::Stable;
        }

        let file = redact_path(path);
        let Some(mut last) = snapshot(path) else {
            return StabilityVerdict::Disappeared;
        };

        debug!(file = %file, "Checking file stability");
        let started = Instant::now();
        let mut quiet_since = Instant::now();

        while quiet_since.elapsed() < self.config.duration {
            std::thread::sleep(self.config.interval);

            let Some(current) = snapshot(path) else {
                warn!(file = %file, "File disappeared during stability check");
                return StabilityVerdict::Disappeared;
            };

            if current != last {
                debug!(file = %file, size = current.len, "File still being modified");
                last = current;
                quiet_since = Instant::now();
            }

            if let Some(max_wait) = self.config.max_wait {
                if started.elapsed() >= max_wait && quiet_since.elapsed() < self.config.duration {
                    warn!(file = %file, waited = ?started.elapsed(), "File did not settle in time");
                    return StabilityVerdict::StillChanging;
                }
            }
        }

        debug!(file = %file, "File is stable");
        StabilityVerdict::Stable
    }
}

fn snapshot(path: &Path) -> Option<Snapshot> {
    std::fs::metadata(path).ok().map(|m| Snapshot::from(&m))
}
