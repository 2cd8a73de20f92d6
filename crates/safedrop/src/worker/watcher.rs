use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use notify::{Config as NotifyConfig, PollWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer_opt, Config as DebouncerConfig, DebouncedEventKind};
use walkdir::WalkDir;

use crate::error::WorkerError;
use crate::sanitize::redact_path;
use crate::worker::job::Job;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEBOUNCE_TIMEOUT: Duration = Duration::from_millis(500);

/// Feeds files that appear in the source directory to the pool.
///
/// Only the top level is watched. Paths under any excluded directory (the
/// quarantine and destination trees when they live inside the source) are
/// ignored, as are directories. The same path may be reported more than
/// once.
pub struct DirectoryWatcher {
    source: PathBuf,
    excluded: Vec<PathBuf>,
    poll_interval: Duration,
}

impl DirectoryWatcher {
    pub fn new<P: AsRef<Path>>(source: P) -> Self {
        Self {
            source: source.as_ref().to_path_buf(),
            excluded: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn exclude<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.excluded.push(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    fn is_candidate(&self, path: &Path) -> bool {
        if self.excluded.iter().any(|dir| path.starts_with(dir)) {
            return false;
        }
        path.is_file()
    }

    /// Jobs for the files already sitting in the source directory.
    pub fn scan(&self) -> Result<Vec<Job>, WorkerError> {
        let mut jobs = Vec::new();

        for entry in WalkDir::new(&self.source)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(WorkerError::ScanFailed {
                        path: self.source.clone(),
                        source: e,
                    });
                }
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if self.is_candidate(path) {
                debug!("Found file: {}", redact_path(path));
                jobs.push(Job::new(path.to_path_buf()));
            }
        }

        info!("Scanned {} files in {}", jobs.len(), self.source.display());
        Ok(jobs)
    }

    /// Blocks, calling `callback` for each new or modified file, until
    /// `shutdown` is set.
    pub fn watch<F>(&self, callback: F, shutdown: Arc<AtomicBool>) -> Result<(), WorkerError>
    where
        F: Fn(PathBuf),
    {
        // Use PollWatcher for Docker/NFS compatibility
        let poll_config = NotifyConfig::default().with_poll_interval(self.poll_interval);

        let debouncer_config = DebouncerConfig::default()
            .with_timeout(DEBOUNCE_TIMEOUT)
            .with_notify_config(poll_config);

        let (tx, rx) = std::sync::mpsc::channel();

        let mut debouncer = new_debouncer_opt::<_, PollWatcher>(debouncer_config, tx)
            .map_err(|e| WorkerError::WatchError(e.to_string()))?;

        debouncer
            .watcher()
            .watch(&self.source, RecursiveMode::NonRecursive)
            .map_err(|e| WorkerError::WatchError(e.to_string()))?;

        info!("Watching directory: {}", self.source.display());

        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Watch mode shutting down...");
                break;
            }

            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(Ok(events)) => {
                    for event in events {
                        if matches!(event.kind, DebouncedEventKind::Any)
                            && self.is_candidate(&event.path)
                        {
                            info!("New file detected: {}", redact_path(&event.path));
                            callback(event.path);
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!("Watch error: {:?}", e);
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    continue;
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    error!("Watch channel disconnected");
                    break;
                }
            }
        }

        Ok(())
    }
}
