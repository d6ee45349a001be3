use thiserror::Error;

/// Fatal setup-phase failures. Anything in here halts the run before the
/// first branch is touched; per-branch failures never surface through this
/// type, they are contained inside the synchronizer.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("not a valid git work tree: {0}")]
    InvalidWorkTree(String),
    #[error("cache directory unavailable: {0}")]
    CacheDirUnavailable(String),
    #[error("exactly one remote is required, found {0:?}")]
    UnsupportedRemotes(Vec<String>),
    #[error("another update run appears to be active: {0}")]
    AlreadyRunning(String),
}
