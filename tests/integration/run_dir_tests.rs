use chrono::{Local, TimeZone};
use snapledger::manifest::MANIFEST_FILE_NAME;
use snapledger::pipeline::{track_run, TrackOptions};
use snapledger::run_dir::{find_runs, RunDirectory};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_tracked_runs_are_discovered_in_order() {
    let root = tempdir().unwrap();
    let options = TrackOptions::for_backup_root(root.path());
    for (month, day) in [(3, 9), (1, 20), (12, 1)] {
        let when = Local
            .with_ymd_and_hms(2024, month, day, 8, 30, 0)
            .single()
            .unwrap();
        let run = RunDirectory::create(root.path(), &when).unwrap();
        fs::write(run.subdir("photo.jpg"), "same").unwrap();
        track_run(run.path(), &options, None).unwrap();
        assert!(run.has_manifest());
    }

    let found: Vec<_> = find_runs(root.path())
        .iter()
        .map(|r| r.path().to_path_buf())
        .collect();
    let expected = vec![
        root.path().join("2024/01/20/0830"),
        root.path().join("2024/03/09/0830"),
        root.path().join("2024/12/01/0830"),
    ];
    assert_eq!(found, expected);
}

#[test]
fn test_ledger_and_plans_are_not_runs() {
    let root = tempdir().unwrap();
    fs::create_dir_all(root.path().join("reclaim_plans")).unwrap();
    fs::write(root.path().join("hash_ledger.json"), "{}").unwrap();
    let stray = root.path().join("a/b/c");
    fs::create_dir_all(&stray).unwrap();
    fs::write(stray.join(MANIFEST_FILE_NAME), "").unwrap();

    assert!(find_runs(root.path()).is_empty());
}
