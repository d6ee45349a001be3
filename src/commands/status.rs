use anyhow::Result;
use std::env;

use crate::commands::CommandReport;
use crate::snapshots::config::load_config;
use crate::snapshots::index;
use crate::snapshots::naming;
use crate::snapshots::paths::resolve_paths;

include!(concat!(env!("OUT_DIR"), "/snapsync_env_allowlist.rs"));

fn format_epoch(secs: u64) -> String {
    chrono::DateTime::from_timestamp(secs as i64, 0)
        .map(|stamp| stamp.to_rfc2822())
        .unwrap_or_else(|| secs.to_string())
}

pub fn run() -> Result<CommandReport> {
    let cfg = load_config()?;
    let repo_id = cfg.repository_id();
    let paths = resolve_paths(&repo_id)?;
    let mut report = CommandReport::new("status");

    report.detail(format!("build_id={}", env!("BUILD_UUID")));
    report.detail(format!("repo_dir={}", cfg.repository_dir().display()));
    report.detail(format!("repository_id={repo_id}"));
    report.detail(format!("snap_home={}", paths.snap_home.display()));
    report.detail(format!("cache_dir={}", paths.cache_dir.display()));
    report.detail(format!("archive_dir={}", paths.archive_dir.display()));
    report.detail(format!("index_file={}", paths.index_file.display()));

    for (key, _) in env::vars() {
        if key.starts_with("SNAPSYNC_") && !GENERATED_SNAPSYNC_ENV_ALLOWLIST.contains(&key.as_str())
        {
            report.issue(format!("unknown environment override {key}"));
        }
    }

    if !paths.archive_dir.exists() {
        report.detail("archive dir not created yet (no update has run)");
    }
    if !paths.index_file.exists() {
        report.detail("no index yet; run `snapsync update` first");
        return Ok(report);
    }

    let loaded = match index::load(&paths.index_file) {
        Ok(loaded) => loaded,
        Err(err) => {
            report.issue(format!("index unreadable: {err:#}"));
            return Ok(report);
        }
    };

    report.detail(format!(
        "last update: started {} / ended {}",
        format_epoch(loaded.update_started_epoch_secs),
        format_epoch(loaded.update_ended_epoch_secs)
    ));
    report.detail(format!("tracked branches: {}", loaded.branches.len()));
    for (branch, record) in &loaded.branches {
        let short = naming::short_commit_id(&record.head_commit_id);
        match &record.snapshot {
            Some(snapshot) => report.detail(format!(
                "  {branch}: {short} -> {} ({} bytes)",
                snapshot.path, snapshot.byte_size
            )),
            None => report.detail(format!(
                "  {branch}: {short} -> no archive (last build failed)"
            )),
        }
    }

    Ok(report)
}
