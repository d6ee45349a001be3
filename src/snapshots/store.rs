//! Archive materialization and maintenance.
//!
//! `FsArchiveStore::build` is atomic from the caller's perspective: the
//! tar stream from `git archive` is gzipped into a temp file in the
//! destination directory and only renamed into place once the stream and
//! the child process both finished cleanly. Either the final file exists
//! complete, or it does not exist at all — an interrupted build can never
//! satisfy a later exists-check.

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use md5::Md5;
use sha1::{Digest, Sha1};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::NamedTempFile;

use crate::snapshots::git::resolve_git_bin;

pub trait ArchiveStore {
    fn archive_exists(&self, path: &Path) -> bool;
    fn build(&self, work_tree: &Path, out_path: &Path) -> Result<()>;
    fn hash_sha1(&self, path: &Path) -> Result<String>;
    fn hash_md5(&self, path: &Path) -> Result<String>;
    fn file_size(&self, path: &Path) -> Result<u64>;
    fn remove(&self, path: &Path) -> Result<()>;
    fn create_alias(&self, target: &Path, alias: &Path) -> Result<()>;
    fn remove_alias(&self, alias: &Path) -> Result<()>;
}

pub fn hash_sha1_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(format!("{:x}", Sha1::digest(&bytes)))
}

pub fn hash_md5_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(format!("{:x}", Md5::digest(&bytes)))
}

pub fn file_size(path: &Path) -> Result<u64> {
    let meta =
        fs::metadata(path).with_context(|| format!("failed to stat {}", path.display()))?;
    Ok(meta.len())
}

#[derive(Debug, Clone)]
pub struct FsArchiveStore {
    git_bin: PathBuf,
}

impl FsArchiveStore {
    pub fn new() -> Result<Self> {
        Ok(Self {
            git_bin: resolve_git_bin()?,
        })
    }
}

impl ArchiveStore for FsArchiveStore {
    fn archive_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn build(&self, work_tree: &Path, out_path: &Path) -> Result<()> {
        let dir = out_path
            .parent()
            .context("archive path has no parent directory")?;
        let mut staging = NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create staging file in {}", dir.display()))?;

        let mut child = Command::new(&self.git_bin)
            .current_dir(work_tree)
            .args(["archive", "--format=tar", "HEAD"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("failed to spawn git archive")?;

        {
            let mut tar_stream = child
                .stdout
                .take()
                .context("git archive produced no stdout handle")?;
            let mut encoder = GzEncoder::new(&mut staging, Compression::default());
            io::copy(&mut tar_stream, &mut encoder)
                .context("failed to compress archive stream")?;
            encoder.finish().context("failed to finalize gzip stream")?;
        }

        let out = child
            .wait_with_output()
            .context("failed waiting for git archive")?;
        if !out.status.success() {
            anyhow::bail!(
                "git archive failed\nstderr: {}",
                String::from_utf8_lossy(&out.stderr)
            );
        }

        staging.persist(out_path).map_err(|err| {
            anyhow::anyhow!("failed to persist archive to {}: {err}", out_path.display())
        })?;
        Ok(())
    }

    fn hash_sha1(&self, path: &Path) -> Result<String> {
        hash_sha1_file(path)
    }

    fn hash_md5(&self, path: &Path) -> Result<String> {
        hash_md5_file(path)
    }

    fn file_size(&self, path: &Path) -> Result<u64> {
        file_size(path)
    }

    fn remove(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).with_context(|| format!("failed to remove {}", path.display()))
    }

    fn create_alias(&self, target: &Path, alias: &Path) -> Result<()> {
        // A hard link: the alias stays valid on its own and needs no
        // symlink support from the filesystem.
        fs::hard_link(target, alias).with_context(|| {
            format!(
                "failed to link {} -> {}",
                alias.display(),
                target.display()
            )
        })
    }

    fn remove_alias(&self, alias: &Path) -> Result<()> {
        fs::remove_file(alias).with_context(|| format!("failed to remove {}", alias.display()))
    }
}
