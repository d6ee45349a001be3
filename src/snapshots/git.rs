//! The repository client: everything the synchronizer needs from git,
//! behind a trait so the branch loop can be exercised without a real clone.

use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::warn;

pub trait RepoClient {
    fn is_valid_work_tree(&self) -> bool;
    fn list_remotes(&self) -> Result<Vec<String>>;
    fn list_remote_branches(&self) -> Result<Vec<String>>;
    fn fetch(&self, remote: &str) -> Result<()>;
    /// Resolve a ref to a full commit id.
    fn resolve_ref(&self, refname: &str) -> Result<String>;
    /// Check out a ref into the working tree (detached).
    fn checkout(&self, refname: &str) -> Result<()>;
    /// Author time of the ref's commit, in Unix seconds. Unparseable
    /// output yields 0.
    fn commit_author_time(&self, refname: &str) -> Result<i64>;
    fn clean_and_reset(&self) -> Result<()>;
}

/// A full 40-hex-digit commit id, as `git rev-parse --verify` prints one.
pub fn is_commit_id(input: &str) -> bool {
    input.len() == 40 && input.chars().all(|ch| ch.is_ascii_hexdigit())
}

pub(crate) fn resolve_git_bin() -> Result<PathBuf> {
    if let Ok(custom) = env::var("SNAPSYNC_GIT_BIN") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            let path = PathBuf::from(trimmed);
            if path.is_file() {
                return Ok(path);
            }
            anyhow::bail!(
                "SNAPSYNC_GIT_BIN does not point to a file: {}",
                path.display()
            );
        }
    }
    let found = which::which("git").context("git binary not found on PATH (set SNAPSYNC_GIT_BIN)")?;
    Ok(found)
}

fn clean_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[derive(Debug, Clone)]
pub struct GitCli {
    bin: PathBuf,
    work_tree: PathBuf,
}

impl GitCli {
    pub fn new(work_tree: &Path) -> Result<Self> {
        Ok(Self {
            bin: resolve_git_bin()?,
            work_tree: work_tree.to_path_buf(),
        })
    }

    fn run_git(&self, args: &[&str]) -> Result<Output> {
        let out = Command::new(&self.bin)
            .current_dir(&self.work_tree)
            .args(args)
            .output()
            .with_context(|| format!("failed to run `{} {}`", self.bin.display(), args.join(" ")))?;
        Ok(out)
    }

    fn run_git_checked(&self, args: &[&str]) -> Result<String> {
        let out = self.run_git(args)?;
        if !out.status.success() {
            anyhow::bail!(
                "git {} failed\nstdout: {}\nstderr: {}",
                args.join(" "),
                String::from_utf8_lossy(&out.stdout),
                String::from_utf8_lossy(&out.stderr)
            );
        }
        Ok(String::from_utf8_lossy(&out.stdout).to_string())
    }
}

impl RepoClient for GitCli {
    fn is_valid_work_tree(&self) -> bool {
        self.run_git(&["rev-parse", "--is-inside-work-tree"])
            .map(|out| {
                out.status.success() && String::from_utf8_lossy(&out.stdout).trim() == "true"
            })
            .unwrap_or(false)
    }

    fn list_remotes(&self) -> Result<Vec<String>> {
        Ok(clean_lines(&self.run_git_checked(&["remote"])?))
    }

    fn list_remote_branches(&self) -> Result<Vec<String>> {
        Ok(clean_lines(&self.run_git_checked(&[
            "branch",
            "-r",
            "--color=never",
        ])?))
    }

    fn fetch(&self, remote: &str) -> Result<()> {
        self.run_git_checked(&["fetch", remote])?;
        Ok(())
    }

    fn resolve_ref(&self, refname: &str) -> Result<String> {
        Ok(self
            .run_git_checked(&["rev-parse", "--verify", refname])?
            .trim()
            .to_string())
    }

    fn checkout(&self, refname: &str) -> Result<()> {
        // Checking out a remote branch head lands in a detached state; -q
        // suppresses the informative message.
        self.run_git_checked(&["checkout", "-q", refname])?;
        Ok(())
    }

    fn commit_author_time(&self, refname: &str) -> Result<i64> {
        let raw = self.run_git_checked(&["show", "-s", "--format=%at", refname])?;
        Ok(raw.trim().parse::<i64>().unwrap_or(0))
    }

    fn clean_and_reset(&self) -> Result<()> {
        // A run that died mid-checkout can leave a lock behind; git refuses
        // to touch the index while it exists.
        let stale_lock = self.work_tree.join(".git").join("index.lock");
        if stale_lock.exists() {
            warn!("removing stale {}", stale_lock.display());
            let _ = fs::remove_file(&stale_lock);
        }

        self.run_git_checked(&["reset", "--hard", "-q"])?;
        self.run_git_checked(&["clean", "-xdff", "-q"])?;
        Ok(())
    }
}
