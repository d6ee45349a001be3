//! The per-branch synchronizer.
//!
//! Reconciles one remote branch against the recorded state: resolve the
//! head, short-circuit if the archive for that exact head already exists,
//! otherwise check out, verify the checkout really happened, archive, and
//! hash. Every failure is contained to the branch — the outer loop never
//! aborts because one branch misbehaved.

use anyhow::Result;
use std::path::Path;
use tracing::{error, info, warn};

use crate::snapshots::git::{self, RepoClient};
use crate::snapshots::index::{ArchiveRef, BranchRecord};
use crate::snapshots::latest;
use crate::snapshots::naming;
use crate::snapshots::store::ArchiveStore;

/// Everything one run threads through the branch loop. No ambient state:
/// the working tree is an exclusive resource and the context is the only
/// handle to it.
pub struct RunContext<'a> {
    pub repo_id: &'a str,
    pub remote: &'a str,
    pub primary_branch: &'a str,
    pub work_tree: &'a Path,
    pub archive_dir: &'a Path,
    pub repo: &'a dyn RepoClient,
    pub store: &'a dyn ArchiveStore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    ResolveFailed(String),
    CheckoutFailed(String),
    /// HEAD did not resolve to a well-formed commit id after checkout.
    MalformedHead(String),
    /// HEAD resolved but does not match the remote head we asked for —
    /// a partially-applied checkout must never be archived.
    HeadMismatch { expected: String, actual: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchOutcome {
    /// An archive for this exact head already exists; nothing to do.
    AlreadyCurrent,
    /// This branch could not be processed; its record must not change.
    Skipped(SkipReason),
    /// The head was reached; the record carries the new head and either a
    /// fresh archive reference or `None` when the build failed.
    Updated(BranchRecord),
}

/// What to write into the new index for a branch, resolved from the
/// outcome and the prior record before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordDisposition {
    NoPrior,
    CarryForward(BranchRecord),
    Store(BranchRecord),
}

pub fn resolve_disposition(
    outcome: BranchOutcome,
    prior: Option<&BranchRecord>,
) -> RecordDisposition {
    match outcome {
        BranchOutcome::Updated(record) => RecordDisposition::Store(record),
        BranchOutcome::AlreadyCurrent | BranchOutcome::Skipped(_) => match prior {
            Some(previous) => RecordDisposition::CarryForward(previous.clone()),
            None => RecordDisposition::NoPrior,
        },
    }
}

pub fn sync_branch(ctx: &RunContext<'_>, remote_ref: &str, branch: &str) -> BranchOutcome {
    let head = match ctx.repo.resolve_ref(remote_ref) {
        Ok(head) => head,
        Err(err) => {
            warn!("{branch}: cannot resolve {remote_ref}, skipping: {err:#}");
            return BranchOutcome::Skipped(SkipReason::ResolveFailed(format!("{err:#}")));
        }
    };
    info!("{branch}: head {head}");

    let file_name = naming::archive_file_name(ctx.repo_id, branch, &head);
    let archive_path = ctx.archive_dir.join(&file_name);
    if ctx.store.archive_exists(&archive_path) {
        info!("{branch}: a snapshot of this exact head already exists, no update needed");
        return BranchOutcome::AlreadyCurrent;
    }

    info!("{branch}: checking out {remote_ref}");
    if let Err(err) = ctx.repo.checkout(remote_ref) {
        warn!("{branch}: checkout failed, skipping: {err:#}");
        return BranchOutcome::Skipped(SkipReason::CheckoutFailed(format!("{err:#}")));
    }

    // Verify the checkout actually happened. A leftover index.lock once
    // made every archive of a run point at the same revision; comparing
    // HEAD against the remote head closes that hole for good.
    let current = match ctx.repo.resolve_ref("HEAD") {
        Ok(current) => current,
        Err(err) => {
            warn!("{branch}: rev-parse failed for HEAD, skipping: {err:#}");
            return BranchOutcome::Skipped(SkipReason::CheckoutFailed(format!("{err:#}")));
        }
    };
    if !git::is_commit_id(&current) {
        warn!("{branch}: HEAD is not a commit id ({current}), skipping");
        return BranchOutcome::Skipped(SkipReason::MalformedHead(current));
    }
    if current != head {
        warn!(
            "{branch}: HEAD {current} does not match remote head {head} after checkout, skipping"
        );
        return BranchOutcome::Skipped(SkipReason::HeadMismatch {
            expected: head,
            actual: current,
        });
    }

    let head_timestamp = match ctx.repo.commit_author_time("HEAD") {
        Ok(secs) => secs,
        Err(err) => {
            warn!("{branch}: could not read author time, storing 0: {err:#}");
            0
        }
    };

    info!("{branch}: generating archive {file_name}");
    if let Err(err) = ctx.store.build(ctx.work_tree, &archive_path) {
        error!("{branch}: archive build failed: {err:#}");
    }
    if !ctx.store.archive_exists(&archive_path) {
        // Record that the head was reached so the next run knows, but keep
        // snapshot empty — the previous good archive reference survives via
        // carry-forward until a build succeeds again.
        return BranchOutcome::Updated(BranchRecord {
            head_commit_id: head,
            head_timestamp,
            snapshot: None,
        });
    }

    let snapshot = match describe_archive(ctx.store, &archive_path, &file_name) {
        Ok(archive_ref) => Some(archive_ref),
        Err(err) => {
            error!("{branch}: could not record archive integrity data: {err:#}");
            // An archive with no recorded hashes would short-circuit every
            // future run while staying unverifiable; drop it and retry next
            // time.
            if let Err(remove_err) = ctx.store.remove(&archive_path) {
                warn!("{branch}: could not remove unusable archive {file_name}: {remove_err:#}");
            }
            None
        }
    };

    if snapshot.is_some() && branch == ctx.primary_branch {
        info!("{branch}: new primary-branch archive, updating latest alias");
        if let Err(err) =
            latest::update_latest_alias(ctx.store, ctx.archive_dir, ctx.repo_id, &archive_path)
        {
            warn!("{branch}: latest alias update failed: {err:#}");
        }
    }

    BranchOutcome::Updated(BranchRecord {
        head_commit_id: head,
        head_timestamp,
        snapshot,
    })
}

fn describe_archive(
    store: &dyn ArchiveStore,
    path: &Path,
    file_name: &str,
) -> Result<ArchiveRef> {
    Ok(ArchiveRef {
        path: file_name.to_string(),
        hash_sha1: store.hash_sha1(path)?,
        hash_md5: store.hash_md5(path)?,
        byte_size: store.file_size(path)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::RefCell;
    use std::collections::{BTreeMap, BTreeSet};
    use std::path::PathBuf;

    fn commit(ch: char) -> String {
        std::iter::repeat_n(ch, 40).collect()
    }

    #[derive(Default)]
    struct FakeRepo {
        refs: BTreeMap<String, String>,
        checkouts: RefCell<Vec<String>>,
        author_time: i64,
    }

    impl RepoClient for FakeRepo {
        fn is_valid_work_tree(&self) -> bool {
            true
        }

        fn list_remotes(&self) -> Result<Vec<String>> {
            Ok(vec!["origin".to_string()])
        }

        fn list_remote_branches(&self) -> Result<Vec<String>> {
            Ok(self.refs.keys().cloned().collect())
        }

        fn fetch(&self, _remote: &str) -> Result<()> {
            Ok(())
        }

        fn resolve_ref(&self, refname: &str) -> Result<String> {
            self.refs
                .get(refname)
                .cloned()
                .ok_or_else(|| anyhow!("unknown ref {refname}"))
        }

        fn checkout(&self, refname: &str) -> Result<()> {
            self.checkouts.borrow_mut().push(refname.to_string());
            Ok(())
        }

        fn commit_author_time(&self, _refname: &str) -> Result<i64> {
            Ok(self.author_time)
        }

        fn clean_and_reset(&self) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeStore {
        existing: RefCell<BTreeSet<PathBuf>>,
        built: RefCell<Vec<PathBuf>>,
        aliases: RefCell<Vec<(PathBuf, PathBuf)>>,
        removed: RefCell<Vec<PathBuf>>,
        fail_builds: bool,
    }

    impl ArchiveStore for FakeStore {
        fn archive_exists(&self, path: &Path) -> bool {
            self.existing.borrow().contains(path)
        }

        fn build(&self, _work_tree: &Path, out_path: &Path) -> Result<()> {
            if self.fail_builds {
                return Err(anyhow!("tar stream broke"));
            }
            self.built.borrow_mut().push(out_path.to_path_buf());
            self.existing.borrow_mut().insert(out_path.to_path_buf());
            Ok(())
        }

        fn hash_sha1(&self, _path: &Path) -> Result<String> {
            Ok("sha1".to_string())
        }

        fn hash_md5(&self, _path: &Path) -> Result<String> {
            Ok("md5".to_string())
        }

        fn file_size(&self, _path: &Path) -> Result<u64> {
            Ok(42)
        }

        fn remove(&self, path: &Path) -> Result<()> {
            self.existing.borrow_mut().remove(path);
            self.removed.borrow_mut().push(path.to_path_buf());
            Ok(())
        }

        fn create_alias(&self, target: &Path, alias: &Path) -> Result<()> {
            self.existing.borrow_mut().insert(alias.to_path_buf());
            self.aliases
                .borrow_mut()
                .push((target.to_path_buf(), alias.to_path_buf()));
            Ok(())
        }

        fn remove_alias(&self, alias: &Path) -> Result<()> {
            self.existing.borrow_mut().remove(alias);
            Ok(())
        }
    }

    fn ctx<'a>(repo: &'a FakeRepo, store: &'a FakeStore, archive_dir: &'a Path) -> RunContext<'a> {
        RunContext {
            repo_id: "demo",
            remote: "origin",
            primary_branch: "master",
            work_tree: Path::new("/work"),
            archive_dir,
            repo,
            store,
        }
    }

    #[test]
    fn existing_archive_short_circuits_before_any_checkout() {
        let head = commit('a');
        let mut repo = FakeRepo::default();
        repo.refs.insert("origin/master".to_string(), head.clone());
        repo.refs.insert("HEAD".to_string(), head.clone());

        let store = FakeStore::default();
        let archive_dir = PathBuf::from("/archives");
        store.existing.borrow_mut().insert(
            archive_dir.join(naming::archive_file_name("demo", "master", &head)),
        );

        let outcome = sync_branch(&ctx(&repo, &store, &archive_dir), "origin/master", "master");

        assert_eq!(outcome, BranchOutcome::AlreadyCurrent);
        assert!(repo.checkouts.borrow().is_empty());
        assert!(store.built.borrow().is_empty());
    }

    #[test]
    fn head_mismatch_after_checkout_builds_nothing() {
        let mut repo = FakeRepo::default();
        repo.refs.insert("origin/master".to_string(), commit('a'));
        repo.refs.insert("HEAD".to_string(), commit('b'));

        let store = FakeStore::default();
        let archive_dir = PathBuf::from("/archives");

        let outcome = sync_branch(&ctx(&repo, &store, &archive_dir), "origin/master", "master");

        assert_eq!(
            outcome,
            BranchOutcome::Skipped(SkipReason::HeadMismatch {
                expected: commit('a'),
                actual: commit('b'),
            })
        );
        assert!(store.built.borrow().is_empty());
    }

    #[test]
    fn malformed_head_is_a_checkout_failure() {
        let mut repo = FakeRepo::default();
        repo.refs.insert("origin/master".to_string(), commit('a'));
        repo.refs
            .insert("HEAD".to_string(), "fatal: not a thing".to_string());

        let store = FakeStore::default();
        let archive_dir = PathBuf::from("/archives");

        let outcome = sync_branch(&ctx(&repo, &store, &archive_dir), "origin/master", "master");

        assert_eq!(
            outcome,
            BranchOutcome::Skipped(SkipReason::MalformedHead("fatal: not a thing".to_string()))
        );
        assert!(store.built.borrow().is_empty());
    }

    #[test]
    fn unresolvable_ref_skips_the_branch() {
        let repo = FakeRepo::default();
        let store = FakeStore::default();
        let archive_dir = PathBuf::from("/archives");

        let outcome = sync_branch(&ctx(&repo, &store, &archive_dir), "origin/gone", "gone");

        assert!(matches!(
            outcome,
            BranchOutcome::Skipped(SkipReason::ResolveFailed(_))
        ));
    }

    #[test]
    fn build_failure_records_the_new_head_without_a_snapshot() {
        let head = commit('c');
        let mut repo = FakeRepo::default();
        repo.refs.insert("origin/REL1_19".to_string(), head.clone());
        repo.refs.insert("HEAD".to_string(), head.clone());
        repo.author_time = 1_700_000_000;

        let store = FakeStore {
            fail_builds: true,
            ..FakeStore::default()
        };
        let archive_dir = PathBuf::from("/archives");

        let outcome = sync_branch(&ctx(&repo, &store, &archive_dir), "origin/REL1_19", "REL1_19");

        assert_eq!(
            outcome,
            BranchOutcome::Updated(BranchRecord {
                head_commit_id: head,
                head_timestamp: 1_700_000_000,
                snapshot: None,
            })
        );
    }

    #[test]
    fn successful_primary_sync_archives_and_repoints_the_alias() {
        let head = commit('d');
        let mut repo = FakeRepo::default();
        repo.refs.insert("origin/master".to_string(), head.clone());
        repo.refs.insert("HEAD".to_string(), head.clone());
        repo.author_time = 1_700_000_123;

        let store = FakeStore::default();
        let archive_dir = PathBuf::from("/archives");

        let outcome = sync_branch(&ctx(&repo, &store, &archive_dir), "origin/master", "master");

        let file_name = naming::archive_file_name("demo", "master", &head);
        assert_eq!(
            outcome,
            BranchOutcome::Updated(BranchRecord {
                head_commit_id: head,
                head_timestamp: 1_700_000_123,
                snapshot: Some(ArchiveRef {
                    path: file_name.clone(),
                    hash_sha1: "sha1".to_string(),
                    hash_md5: "md5".to_string(),
                    byte_size: 42,
                }),
            })
        );
        assert_eq!(repo.checkouts.borrow().as_slice(), ["origin/master"]);

        let aliases = store.aliases.borrow();
        assert_eq!(
            aliases.as_slice(),
            [(
                archive_dir.join(&file_name),
                archive_dir.join("demo-latest.tar.gz"),
            )]
        );
    }

    #[test]
    fn non_primary_branches_leave_the_alias_alone() {
        let head = commit('e');
        let mut repo = FakeRepo::default();
        repo.refs.insert("origin/REL1_19".to_string(), head.clone());
        repo.refs.insert("HEAD".to_string(), head.clone());

        let store = FakeStore::default();
        let archive_dir = PathBuf::from("/archives");

        sync_branch(&ctx(&repo, &store, &archive_dir), "origin/REL1_19", "REL1_19");

        assert!(store.aliases.borrow().is_empty());
    }

    #[test]
    fn disposition_keeps_prior_record_on_skip_and_stores_on_update() {
        let prior = BranchRecord {
            head_commit_id: commit('a'),
            head_timestamp: 7,
            snapshot: None,
        };
        let fresh = BranchRecord {
            head_commit_id: commit('b'),
            head_timestamp: 8,
            snapshot: None,
        };

        assert_eq!(
            resolve_disposition(
                BranchOutcome::Skipped(SkipReason::ResolveFailed("x".to_string())),
                Some(&prior)
            ),
            RecordDisposition::CarryForward(prior.clone())
        );
        assert_eq!(
            resolve_disposition(BranchOutcome::AlreadyCurrent, None),
            RecordDisposition::NoPrior
        );
        assert_eq!(
            resolve_disposition(BranchOutcome::Updated(fresh.clone()), Some(&prior)),
            RecordDisposition::Store(fresh)
        );
    }
}
