use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Which remote branches get snapshotted, and which one owns the
/// `-latest` alias.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchRules {
    pub primary: String,
    pub release_marker: String,
    pub deploy_marker: String,
}

impl Default for BranchRules {
    fn default() -> Self {
        Self {
            primary: "master".to_string(),
            release_marker: "REL".to_string(),
            deploy_marker: "wmf".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RepositoryConfig {
    /// Work tree of the clone to snapshot. Defaults to the current directory.
    pub dir: Option<PathBuf>,
    /// Identifier used in archive file names. Defaults to the directory name.
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SnapshotConfig {
    pub repository: RepositoryConfig,
    pub branches: BranchRules,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct PartialSnapshotConfig {
    repository: Option<RepositoryConfig>,
    branches: Option<BranchRules>,
}

impl SnapshotConfig {
    pub fn repository_dir(&self) -> PathBuf {
        self.repository
            .dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn repository_id(&self) -> String {
        if let Some(id) = &self.repository.id {
            return id.clone();
        }
        self.repository_dir()
            .canonicalize()
            .ok()
            .and_then(|dir| {
                dir.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "repo".to_string())
    }
}

fn env_or_string(var: &str) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn env_or_path(var: &str) -> Option<PathBuf> {
    env_or_string(var).map(PathBuf::from)
}

fn validate(cfg: &SnapshotConfig) -> Result<()> {
    let markers = [
        ("primary branch", &cfg.branches.primary),
        ("release marker", &cfg.branches.release_marker),
        ("deploy marker", &cfg.branches.deploy_marker),
    ];
    for (name, value) in markers {
        if value.trim().is_empty() {
            return Err(anyhow!("invalid {name}: cannot be empty"));
        }
        if value.contains('/') || value.chars().any(char::is_whitespace) {
            return Err(anyhow!(
                "invalid {name} `{value}`: must be a single path segment"
            ));
        }
    }

    if let Some(id) = &cfg.repository.id {
        let bad = id.trim().is_empty()
            || id.contains('/')
            || id.contains('\\')
            || id.chars().any(char::is_whitespace);
        if bad {
            return Err(anyhow!(
                "invalid repository id `{id}`: must be a single file-name-safe segment"
            ));
        }
    }

    Ok(())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("SNAPSYNC_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let base = env::var_os("SNAPSYNC_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".snapsync")))?;
    Some(base.join("config.toml"))
}

fn merge_file_config(base: &mut SnapshotConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    let parsed: PartialSnapshotConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse config {}: {err}", path.display()))?;
    if let Some(repository) = parsed.repository {
        base.repository = repository;
    }
    if let Some(branches) = parsed.branches {
        base.branches = branches;
    }
    Ok(())
}

pub fn load_config() -> Result<SnapshotConfig> {
    let mut cfg = SnapshotConfig::default();
    merge_file_config(&mut cfg)?;

    if let Some(dir) = env_or_path("SNAPSYNC_REPO_DIR") {
        cfg.repository.dir = Some(dir);
    }
    if let Some(id) = env_or_string("SNAPSYNC_REPO_ID") {
        cfg.repository.id = Some(id);
    }
    if let Some(primary) = env_or_string("SNAPSYNC_PRIMARY_BRANCH") {
        cfg.branches.primary = primary;
    }
    if let Some(marker) = env_or_string("SNAPSYNC_RELEASE_MARKER") {
        cfg.branches.release_marker = marker;
    }
    if let Some(marker) = env_or_string("SNAPSYNC_DEPLOY_MARKER") {
        cfg.branches.deploy_marker = marker;
    }

    validate(&cfg)?;
    Ok(cfg)
}
