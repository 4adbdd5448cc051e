use snapledger::duplicates::FileStatus;
use snapledger::ledger::{LedgerStatus, LedgerStore};
use snapledger::manifest::{Manifest, MANIFEST_FILE_NAME};
use snapledger::pipeline::{track_run, PipelineError, TrackOptions, TrackOutcome, TrackReport};
use snapledger::scanner::{Fingerprint, RelativePath};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

fn run_with(root: &Path, name: &str, files: &[(&str, &str)]) -> PathBuf {
    let run = root.join(name);
    for (rel, content) in files {
        let path = run.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    run
}

fn track(root: &TempDir, run: &Path) -> Box<TrackReport> {
    let options = TrackOptions::for_backup_root(root.path());
    match track_run(run, &options, None).unwrap() {
        TrackOutcome::Tracked(report) => report,
        TrackOutcome::NothingToClassify { run_dir } => {
            panic!("nothing to classify in {}", run_dir.display())
        }
    }
}

fn rel(s: &str) -> RelativePath {
    RelativePath::parse(s).unwrap()
}

#[test]
fn test_first_run_everything_changed() {
    let root = tempdir().unwrap();
    let run = run_with(root.path(), "run1", &[("a.txt", "hello"), ("sub/b.txt", "world")]);

    let report = track(&root, &run);

    assert_eq!(report.ledger_status, LedgerStatus::Missing);
    assert_eq!(report.classification.changed_count(), 2);
    assert_eq!(report.classification.new_count(), 2);
    assert!(report.classification.candidates().is_empty());
    assert!(report.plan.is_none());

    let saved = LedgerStore::at_backup_root(root.path()).load().unwrap();
    assert_eq!(saved.status, LedgerStatus::Loaded);
    assert_eq!(saved.ledger.len(), 2);
    assert_eq!(
        saved.ledger.get(&rel("a.txt")),
        Some(&Fingerprint::of_bytes(b"hello"))
    );
}

#[test]
fn test_second_run_no_change() {
    let root = tempdir().unwrap();
    let run1 = run_with(root.path(), "run1", &[("a.txt", "hello")]);
    let run2 = run_with(root.path(), "run2", &[("a.txt", "hello")]);

    track(&root, &run1);
    let report = track(&root, &run2);

    let candidates = report.classification.candidates();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].path, run2.join("a.txt"));
    assert_eq!(candidates[0].status, FileStatus::Unchanged);

    let plan = report.plan.as_ref().unwrap();
    assert_eq!(plan.len(), 1);
    assert_eq!(plan.entries[0].path, run2.join("a.txt"));
    assert_eq!(plan.total_bytes(), 5);

    let ledger = LedgerStore::at_backup_root(root.path()).load().unwrap().ledger;
    assert_eq!(ledger.get(&rel("a.txt")), Some(&Fingerprint::of_bytes(b"hello")));
    // Tracking never removes anything on its own.
    assert!(run2.join("a.txt").exists());
}

#[test]
fn test_change_detection() {
    let root = tempdir().unwrap();
    let run1 = run_with(root.path(), "run1", &[("a.txt", "hello")]);
    let run2 = run_with(root.path(), "run2", &[("a.txt", "hello!")]);

    track(&root, &run1);
    let report = track(&root, &run2);

    let file = &report.classification.files[0];
    assert_eq!(file.status, FileStatus::Modified);
    assert_eq!(file.previous, Some(Fingerprint::of_bytes(b"hello")));
    assert!(report.classification.candidates().is_empty());
    assert!(report.plan.is_none());

    let ledger = LedgerStore::at_backup_root(root.path()).load().unwrap().ledger;
    assert_eq!(ledger.get(&rel("a.txt")), Some(&Fingerprint::of_bytes(b"hello!")));
}

#[test]
fn test_manifest_written_sorted() {
    let root = tempdir().unwrap();
    let run = run_with(
        root.path(),
        "run1",
        &[("z.txt", "z"), ("a/b.txt", "b"), ("a.txt", "a")],
    );

    let report = track(&root, &run);
    assert_eq!(report.manifest_path, run.join(MANIFEST_FILE_NAME));

    let text = fs::read_to_string(&report.manifest_path).unwrap();
    let paths: Vec<&str> = text
        .lines()
        .map(|l| l.split_once("  ").unwrap().1)
        .collect();
    assert_eq!(paths, vec!["a.txt", "a/b.txt", "z.txt"]);

    let reread = Manifest::read(&run).unwrap();
    assert_eq!(reread.len(), 3);
    assert_eq!(reread.get(&rel("z.txt")), Some(&Fingerprint::of_bytes(b"z")));
}

#[test]
fn test_retracking_same_run_ignores_own_manifest() {
    let root = tempdir().unwrap();
    let run = run_with(root.path(), "run1", &[("a.txt", "hello")]);

    track(&root, &run);
    let again = track(&root, &run);

    // The sidecar is not hashed, and the run's own ledger entries never make
    // its files reclaimable.
    assert_eq!(again.classification.files.len(), 1);
    assert!(again.retracked);
    assert!(again.plan.is_none());
}

#[test]
fn test_retracking_never_touches_only_copy() {
    let root = tempdir().unwrap();
    let run = run_with(root.path(), "2024/05/01/1902", &[("a.txt", "only copy")]);
    let options = TrackOptions::for_backup_root(root.path());

    track_run(&run, &options, None).unwrap();
    let TrackOutcome::Tracked(again) = track_run(&run, &options, None).unwrap() else {
        panic!("expected a tracked run");
    };
    assert!(again.plan.is_none());

    // A later run with the same content still plans against the first one.
    let run2 = run_with(root.path(), "2024/05/02/0900", &[("a.txt", "only copy")]);
    let TrackOutcome::Tracked(second) = track_run(&run2, &options, None).unwrap() else {
        panic!("expected a tracked run");
    };
    let plan = second.plan.expect("the second run holds a duplicate");
    assert_eq!(plan.len(), 1);
    assert!(plan.entries[0].path.starts_with(&run2));
    assert!(run.join("a.txt").exists());
}

#[test]
fn test_missing_run_dir_writes_nothing() {
    let root = tempdir().unwrap();
    let options = TrackOptions::for_backup_root(root.path());

    let outcome = track_run(&root.path().join("never"), &options, None).unwrap();
    assert!(matches!(outcome, TrackOutcome::NothingToClassify { .. }));
    assert!(!LedgerStore::at_backup_root(root.path()).path().exists());
}

#[test]
fn test_empty_run_dir_is_nothing_to_classify() {
    let root = tempdir().unwrap();
    let run = root.path().join("empty");
    fs::create_dir_all(run.join("media")).unwrap();
    let options = TrackOptions::for_backup_root(root.path());

    let outcome = track_run(&run, &options, None).unwrap();
    assert!(matches!(outcome, TrackOutcome::NothingToClassify { .. }));
    assert!(!run.join(MANIFEST_FILE_NAME).exists());
}

#[test]
fn test_interrupt_persists_nothing() {
    let root = tempdir().unwrap();
    let run = run_with(root.path(), "run1", &[("a.txt", "hello")]);
    let options = TrackOptions::for_backup_root(root.path())
        .with_shutdown_flag(Arc::new(AtomicBool::new(true)));

    let err = track_run(&run, &options, None).unwrap_err();
    assert!(matches!(err, PipelineError::Interrupted));
    assert!(err.is_interrupted());
    assert!(!run.join(MANIFEST_FILE_NAME).exists());
    assert!(!LedgerStore::at_backup_root(root.path()).path().exists());
}

#[test]
fn test_plan_script_exported() {
    let root = tempdir().unwrap();
    let run1 = run_with(root.path(), "run1", &[("a.txt", "hello")]);
    let run2 = run_with(root.path(), "run2", &[("a.txt", "hello")]);
    let plans = root.path().join("plans");
    let options = TrackOptions::for_backup_root(root.path()).with_plan_dir(&plans);

    track_run(&run1, &options, None).unwrap();
    assert!(!plans.exists(), "first run has nothing to plan");

    let TrackOutcome::Tracked(report) = track_run(&run2, &options, None).unwrap() else {
        panic!("expected a tracked run");
    };
    let script = report.plan_script.unwrap();
    assert!(script.starts_with(&plans));
    let body = fs::read_to_string(&script).unwrap();
    assert!(body.contains("DELETE"));
    assert!(body.contains("a.txt"));
    // Exporting the plan does not remove anything.
    assert!(run2.join("a.txt").exists());
}

#[test]
fn test_rename_is_not_duplicate() {
    let root = tempdir().unwrap();
    let run1 = run_with(root.path(), "run1", &[("a.txt", "hello")]);
    let run2 = run_with(root.path(), "run2", &[("renamed.txt", "hello")]);

    track(&root, &run1);
    let report = track(&root, &run2);

    assert_eq!(report.classification.new_count(), 1);
    assert!(report.plan.is_none());
    assert_eq!(report.classification.carried_forward, 1);

    let ledger = LedgerStore::at_backup_root(root.path()).load().unwrap().ledger;
    assert!(ledger.contains(&rel("a.txt")));
    assert!(ledger.contains(&rel("renamed.txt")));
}

#[test]
fn test_empty_files_are_tracked() {
    let root = tempdir().unwrap();
    let run1 = run_with(root.path(), "run1", &[("empty.bin", "")]);
    let run2 = run_with(root.path(), "run2", &[("empty.bin", "")]);

    track(&root, &run1);
    let report = track(&root, &run2);

    assert_eq!(report.classification.unchanged_count(), 1);
    assert_eq!(report.plan.unwrap().total_bytes(), 0);
}

#[cfg(unix)]
#[test]
fn test_unreadable_file_skipped_and_carried_forward() {
    use std::os::unix::fs::PermissionsExt;

    let root = tempdir().unwrap();
    let run1 = run_with(root.path(), "run1", &[("a.txt", "hello"), ("locked.db", "v1")]);
    let run2 = run_with(root.path(), "run2", &[("a.txt", "hello"), ("locked.db", "v2")]);
    track(&root, &run1);

    let locked = run2.join("locked.db");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read(&locked).is_ok() {
        // Running as root: permissions are not enforced.
        return;
    }

    let report = track(&root, &run2);
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

    assert!(report.is_partial());
    assert_eq!(report.skipped_files.len(), 1);
    assert_eq!(report.classification.files.len(), 1);

    let manifest = Manifest::read(&run2).unwrap();
    assert!(manifest.get(&rel("locked.db")).is_none());

    let ledger = LedgerStore::at_backup_root(root.path()).load().unwrap().ledger;
    assert_eq!(ledger.get(&rel("locked.db")), Some(&Fingerprint::of_bytes(b"v1")));
}
