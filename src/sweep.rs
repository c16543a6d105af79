//! Scheduled deletion of stale output artifacts
//!
//! Batch runs leave encoded videos and frame sequences in an output
//! directory. The sweeper removes regular files whose modification age
//! exceeds the retention period, independently of request handling.

use crate::{
    config::SweepConfig,
    error::{BgRemovalError, Result},
};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Regular files inspected
    pub scanned: usize,
    /// Files removed
    pub deleted: usize,
    /// Files that could not be inspected or removed
    pub failed: usize,
}

/// Deletes artifact files older than the retention period
#[derive(Debug, Clone)]
pub struct ArtifactSweeper {
    config: SweepConfig,
}

impl ArtifactSweeper {
    /// # Errors
    /// - `InvalidConfig` for a zero sweep interval
    pub fn new(config: SweepConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.config.directory
    }

    /// Sweep the artifact directory once, creating it if missing
    ///
    /// # Errors
    /// - `Io` when the directory cannot be created or listed
    pub fn sweep_once(&self) -> Result<SweepReport> {
        self.sweep_at(SystemTime::now())
    }

    /// Sweep as if the current time were `now`
    ///
    /// # Errors
    /// - `Io` when the directory cannot be created or listed
    pub fn sweep_at(&self, now: SystemTime) -> Result<SweepReport> {
        let dir = &self.config.directory;
        fs::create_dir_all(dir)
            .map_err(|e| BgRemovalError::file_io_error("create artifact directory", dir, &e))?;

        let entries = fs::read_dir(dir)
            .map_err(|e| BgRemovalError::file_io_error("read artifact directory", dir, &e))?;

        let mut report = SweepReport::default();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "failed to read artifact directory entry");
                    report.failed += 1;
                    continue;
                }
            };

            let path = entry.path();
            let modified = match entry.metadata() {
                Ok(metadata) if metadata.is_file() => metadata.modified(),
                Ok(_) => continue,
                Err(e) => Err(e),
            };
            report.scanned += 1;

            let modified = match modified {
                Ok(modified) => modified,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot read artifact age");
                    report.failed += 1;
                    continue;
                }
            };

            // Files stamped in the future have age zero
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age <= self.config.retention {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), age_secs = age.as_secs(), "removed stale artifact");
                    report.deleted += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove stale artifact");
                    report.failed += 1;
                }
            }
        }

        if report.deleted > 0 || report.failed > 0 {
            info!(
                directory = %dir.display(),
                scanned = report.scanned,
                deleted = report.deleted,
                failed = report.failed,
                "artifact sweep finished"
            );
        }
        Ok(report)
    }

    /// Run [`ArtifactSweeper::sweep_once`] every interval until `cancel` fires
    ///
    /// The first sweep runs immediately. Must be called from within a Tokio
    /// runtime.
    #[must_use]
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let sweeper = self.clone();
                        match tokio::task::spawn_blocking(move || sweeper.sweep_once()).await {
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) => warn!(error = %e, "artifact sweep failed"),
                            Err(e) => warn!(error = %e, "artifact sweep task failed"),
                        }
                    }
                }
            }
            debug!(directory = %self.config.directory.display(), "artifact sweeper stopped");
        })
    }
}
