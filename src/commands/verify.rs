use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;

use crate::commands::CommandReport;
use crate::snapshots::config::load_config;
use crate::snapshots::index;
use crate::snapshots::naming;
use crate::snapshots::paths::resolve_paths;
use crate::snapshots::store;

#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Also flag archive files the index does not reference.
    pub strict: bool,
}

pub fn run(opts: &VerifyOptions) -> Result<CommandReport> {
    let cfg = load_config()?;
    let repo_id = cfg.repository_id();
    let paths = resolve_paths(&repo_id)?;
    let mut report = CommandReport::new("verify");

    if !paths.index_file.exists() {
        report.detail("no index to verify");
        return Ok(report);
    }
    let loaded = index::load(&paths.index_file)?;

    let mut verified = 0usize;
    for (branch, record) in &loaded.branches {
        let Some(snapshot) = &record.snapshot else {
            report.detail(format!("{branch}: no archive recorded, nothing to check"));
            continue;
        };
        let path = paths.archive_dir.join(&snapshot.path);
        if !path.is_file() {
            report.issue(format!("{branch}: missing archive {}", snapshot.path));
            continue;
        }

        let size = store::file_size(&path)?;
        if size != snapshot.byte_size {
            report.issue(format!(
                "{branch}: {} is {size} bytes, index records {}",
                snapshot.path, snapshot.byte_size
            ));
            continue;
        }
        let sha1 = store::hash_sha1_file(&path)?;
        if sha1 != snapshot.hash_sha1 {
            report.issue(format!("{branch}: SHA-1 mismatch for {}", snapshot.path));
            continue;
        }
        let md5 = store::hash_md5_file(&path)?;
        if md5 != snapshot.hash_md5 {
            report.issue(format!("{branch}: MD5 mismatch for {}", snapshot.path));
            continue;
        }

        verified += 1;
    }
    report.detail(format!("{verified} archive(s) verified"));

    if opts.strict && paths.archive_dir.is_dir() {
        let referenced: BTreeSet<&str> = loaded
            .branches
            .values()
            .filter_map(|record| record.snapshot.as_ref())
            .map(|snapshot| snapshot.path.as_str())
            .collect();
        let alias = naming::latest_alias_name(&repo_id);

        let entries = fs::read_dir(&paths.archive_dir)
            .with_context(|| format!("failed to read {}", paths.archive_dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if !name.ends_with(".tar.gz") || name == alias {
                continue;
            }
            if !referenced.contains(name) {
                report.issue(format!("unindexed archive {name}"));
            }
        }
    }

    Ok(report)
}
