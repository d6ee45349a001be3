//! The update run: the whole archive lifecycle for one repository.
//!
//! Setup failures halt before anything is touched. Once the branch loop
//! starts, failures stay contained to their branch; the index is written
//! exactly once at the end and pruning runs against the old/new pair.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::commands::CommandReport;
use crate::error::SnapshotError;
use crate::snapshots::config::load_config;
use crate::snapshots::filter;
use crate::snapshots::git::{GitCli, RepoClient};
use crate::snapshots::index::{self, SnapshotIndex};
use crate::snapshots::lock::RunLock;
use crate::snapshots::paths::resolve_paths;
use crate::snapshots::prune;
use crate::snapshots::store::FsArchiveStore;
use crate::snapshots::sync::{self, BranchOutcome, RecordDisposition, RunContext};
use crate::snapshots::util::now_epoch_secs;

pub fn run() -> Result<CommandReport> {
    let started = Instant::now();
    let mut report = CommandReport::new("update");

    let cfg = load_config()?;
    let repo_id = cfg.repository_id();
    let repo_dir = cfg.repository_dir();
    let paths = resolve_paths(&repo_id)?;

    info!("--");
    info!("-- {}", Local::now().to_rfc2822());
    info!("-- starting snapshot update for {repo_id}");
    info!("--");

    let repo = GitCli::new(&repo_dir)?;
    if !repo.is_valid_work_tree() {
        return Err(SnapshotError::InvalidWorkTree(repo_dir.display().to_string()).into());
    }

    fs::create_dir_all(&paths.cache_dir).map_err(|err| {
        SnapshotError::CacheDirUnavailable(format!("{}: {err}", paths.cache_dir.display()))
    })?;
    fs::create_dir_all(&paths.archive_dir).map_err(|err| {
        SnapshotError::CacheDirUnavailable(format!("{}: {err}", paths.archive_dir.display()))
    })?;
    let _lock = RunLock::acquire(&paths.lock_file)?;

    let old_index = match index::load(&paths.index_file) {
        Ok(loaded) => loaded,
        Err(err) => {
            // Unparseable state must not guess at pruning candidates; an
            // empty old index means nothing gets deleted this run.
            warn!("previous index is unreadable, treating this as a first run: {err:#}");
            report.detail("previous index was unreadable; no pruning candidates this run");
            SnapshotIndex::default()
        }
    };

    info!("forced clean up and reset...");
    repo.clean_and_reset()
        .context("working tree clean/reset failed")?;

    info!("getting names of remotes...");
    let remotes = repo.list_remotes()?;
    if remotes.len() != 1 {
        return Err(SnapshotError::UnsupportedRemotes(remotes).into());
    }
    let remote = remotes[0].as_str();

    info!("fetching updates from {remote}...");
    if let Err(err) = repo.fetch(remote) {
        warn!("fetch failed, continuing with possibly stale refs: {err:#}");
        report.detail(format!("fetch failed: {err:#}"));
    }

    info!("getting list of remote branches...");
    let mut remote_refs = repo.list_remote_branches()?;
    remote_refs.sort_by(|a, b| filter::natural_cmp(a, b));
    info!("remote branches:");
    for name in &remote_refs {
        info!("  {name}");
    }

    let store = FsArchiveStore::new()?;
    let mut new_index = SnapshotIndex::new(&repo_id, now_epoch_secs()?);
    let ctx = RunContext {
        repo_id: &repo_id,
        remote,
        primary_branch: &cfg.branches.primary,
        work_tree: &repo_dir,
        archive_dir: &paths.archive_dir,
        repo: &repo,
        store: &store,
    };

    let mut updated = 0usize;
    let mut unchanged = 0usize;
    let mut skipped = 0usize;
    let mut filtered = 0usize;
    let mut failed_builds = 0usize;

    for remote_ref in &remote_refs {
        if !filter::is_tracked_branch(remote_ref, &cfg.branches) {
            debug!("{remote_ref}: not a tracked branch name, skipping");
            filtered += 1;
            continue;
        }

        let branch = filter::normalize_branch_name(remote_ref, ctx.remote);
        info!("== {remote_ref} ==");

        let outcome = sync::sync_branch(&ctx, remote_ref, branch);
        match &outcome {
            BranchOutcome::AlreadyCurrent => unchanged += 1,
            BranchOutcome::Skipped(_) => skipped += 1,
            BranchOutcome::Updated(record) => {
                if record.snapshot.is_none() {
                    failed_builds += 1;
                }
                updated += 1;
            }
        }

        match sync::resolve_disposition(outcome, old_index.branches.get(branch)) {
            RecordDisposition::Store(record) | RecordDisposition::CarryForward(record) => {
                new_index.branches.insert(branch.to_string(), record);
            }
            RecordDisposition::NoPrior => {}
        }
    }

    new_index.update_ended_epoch_secs = now_epoch_secs()?;
    info!("writing new index to {}", paths.index_file.display());
    index::save(&paths.index_file, &new_index)?;

    info!("removing superseded snapshots...");
    let pruned = prune::prune_superseded(&store, &paths.archive_dir, &old_index, &new_index);

    info!("final clean up and reset...");
    if let Err(err) = repo.clean_and_reset() {
        warn!("final clean/reset failed: {err:#}");
        report.detail(format!("final clean/reset failed: {err:#}"));
    }

    let elapsed = started.elapsed().as_secs();
    info!("--");
    info!("-- {}", Local::now().to_rfc2822());
    info!("-- done updating snapshots for {repo_id} (took {elapsed}s)");
    info!("--");

    report.detail(format!("remote={remote}"));
    report.detail(format!(
        "branches: {updated} updated, {unchanged} unchanged, {skipped} skipped, {filtered} filtered out"
    ));
    report.detail(format!(
        "prune: {} deleted, {} kept, {} already missing",
        pruned.deleted, pruned.kept, pruned.already_missing
    ));
    report.detail(format!("took {elapsed}s"));

    if skipped > 0 {
        report.issue(format!("{skipped} branch(es) skipped; see the log"));
    }
    if failed_builds > 0 {
        report.issue(format!(
            "{failed_builds} branch(es) reached a new head but produced no archive"
        ));
    }
    if pruned.failed > 0 {
        report.issue(format!(
            "{} stale snapshot(s) could not be deleted",
            pruned.failed
        ));
    }

    Ok(report)
}
