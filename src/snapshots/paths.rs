use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct SnapshotPaths {
    pub snap_home: PathBuf,
    pub cache_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub index_file: PathBuf,
    pub lock_file: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths(repo_id: &str) -> Result<SnapshotPaths> {
    let home = required_home_dir()?;
    let snap_home = env_or_default_path("SNAPSYNC_HOME", home.join(".snapsync"));

    let cache_dir = env_or_default_path("SNAPSYNC_CACHE_DIR", snap_home.join("cache"));
    let archive_dir = env_or_default_path(
        "SNAPSYNC_ARCHIVES_DIR",
        cache_dir.join("snapshots").join(repo_id),
    );
    let index_file =
        env_or_default_path("SNAPSYNC_INDEX_FILE", cache_dir.join("snapshot-index.json"));
    let lock_file = cache_dir.join("update.lock");

    Ok(SnapshotPaths {
        snap_home,
        cache_dir,
        archive_dir,
        index_file,
        lock_file,
    })
}
