//! The persisted snapshot index.
//!
//! Loaded once at the start of a run (the immutable "old" view), rebuilt
//! branch-by-branch during the run, and written back exactly once at the
//! end. The write is atomic: a torn index would make the next prune pass
//! operate on garbage.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRef {
    /// Basename of the archive file inside the archive directory.
    pub path: String,
    pub hash_sha1: String,
    pub hash_md5: String,
    pub byte_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub head_commit_id: String,
    /// Author time of the head commit, Unix seconds; 0 when unparseable.
    pub head_timestamp: i64,
    /// `None` means the head was reached but the archive build failed that
    /// run. The branch staying absent from the map entirely means it was
    /// never synced — the two must round-trip distinctly.
    pub snapshot: Option<ArchiveRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotIndex {
    pub schema_version: u32,
    pub repository_id: String,
    pub update_started_epoch_secs: u64,
    pub update_ended_epoch_secs: u64,
    pub branches: BTreeMap<String, BranchRecord>,
}

impl Default for SnapshotIndex {
    fn default() -> Self {
        Self {
            schema_version: 1,
            repository_id: String::new(),
            update_started_epoch_secs: 0,
            update_ended_epoch_secs: 0,
            branches: BTreeMap::new(),
        }
    }
}

impl SnapshotIndex {
    pub fn new(repository_id: &str, started_epoch_secs: u64) -> Self {
        Self {
            repository_id: repository_id.to_string(),
            update_started_epoch_secs: started_epoch_secs,
            ..Self::default()
        }
    }
}

pub fn load(file: &Path) -> Result<SnapshotIndex> {
    if !file.exists() {
        return Ok(SnapshotIndex::default());
    }

    let raw =
        fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let parsed: SnapshotIndex = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", file.display()))?;
    Ok(parsed)
}

pub fn save(file: &Path, index: &SnapshotIndex) -> Result<()> {
    let parent = file
        .parent()
        .context("index file path has no parent directory")?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;

    let data = serde_json::to_string_pretty(index)?;
    let mut staging = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create staging file in {}", parent.display()))?;
    staging
        .write_all(data.as_bytes())
        .with_context(|| format!("failed to write {}", file.display()))?;
    staging
        .write_all(b"\n")
        .with_context(|| format!("failed to write {}", file.display()))?;
    staging
        .persist(file)
        .map_err(|err| anyhow::anyhow!("failed to persist {}: {err}", file.display()))?;
    Ok(())
}
