//! The `<repo>-latest` alias: a stable name that always refers to the most
//! recent successful primary-branch archive.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

use crate::snapshots::naming;
use crate::snapshots::store::ArchiveStore;

/// Repoint the alias at `target`. Failure to remove a previous alias is
/// tolerated; failure to create the new one is returned to the caller,
/// who reports it without failing the branch — the archive itself and its
/// index record stay valid either way.
pub fn update_latest_alias(
    store: &dyn ArchiveStore,
    archive_dir: &Path,
    repo_id: &str,
    target: &Path,
) -> Result<()> {
    let alias = archive_dir.join(naming::latest_alias_name(repo_id));
    info!("updating {} alias", naming::latest_alias_name(repo_id));

    if store.archive_exists(&alias) {
        if let Err(err) = store.remove_alias(&alias) {
            warn!("could not remove old alias {}: {err:#}", alias.display());
        }
    }

    store
        .create_alias(target, &alias)
        .with_context(|| format!("failed to create alias {}", alias.display()))
}
