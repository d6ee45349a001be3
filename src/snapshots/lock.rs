use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::SnapshotError;

/// Exclusive per-cache run lock. The synchronizer core assumes its caller
/// guarantees mutual exclusion; this is that caller-side guarantee for the
/// CLI. Released on drop.
pub struct RunLock {
    file: File,
}

impl RunLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .with_context(|| format!("failed to open lock file {}", path.display()))?;
        file.try_lock_exclusive().map_err(|err| {
            SnapshotError::AlreadyRunning(format!("{} ({err})", path.display()))
        })?;

        // Leave a pid note for whoever finds the lock held.
        let _ = file.set_len(0);
        let _ = writeln!(&file, "{}", std::process::id());

        Ok(Self { file })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
