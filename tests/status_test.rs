use assert_cmd::Command as SnapCommand;
use predicates::str::contains;
use tempfile::tempdir;

#[test]
fn status_reports_paths_before_any_run() {
    let tmp = tempdir().expect("tempdir");

    SnapCommand::cargo_bin("snapsync")
        .expect("binary")
        .env("SNAPSYNC_HOME", tmp.path())
        .env("SNAPSYNC_REPO_ID", "demo")
        .arg("status")
        .assert()
        .success()
        .stdout(contains("repository_id=demo"))
        .stdout(contains("index_file="))
        .stdout(contains("no index yet"));
}

#[test]
fn status_flags_unknown_environment_overrides() {
    let tmp = tempdir().expect("tempdir");

    SnapCommand::cargo_bin("snapsync")
        .expect("binary")
        .env("SNAPSYNC_HOME", tmp.path())
        .env("SNAPSYNC_REPO_ID", "demo")
        .env("SNAPSYNC_SOMETHING_ELSE", "1")
        .arg("status")
        .assert()
        .failure()
        .stdout(contains("unknown environment override SNAPSYNC_SOMETHING_ELSE"));
}
