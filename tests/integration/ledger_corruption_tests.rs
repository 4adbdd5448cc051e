use snapledger::fsutil::temp_path_for;
use snapledger::ledger::{Ledger, LedgerStatus, LedgerStore, LEDGER_FILE_NAME};
use snapledger::manifest::MANIFEST_FILE_NAME;
use snapledger::pipeline::{track_run, PipelineError, TrackOptions, TrackOutcome};
use snapledger::scanner::{Fingerprint, RelativePath};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn make_run(root: &Path, name: &str, content: &str) -> PathBuf {
    let run = root.join(name);
    fs::create_dir_all(&run).unwrap();
    fs::write(run.join("a.txt"), content).unwrap();
    run
}

fn sample_ledger() -> Ledger {
    let mut ledger = Ledger::new();
    ledger.insert(
        RelativePath::parse("a.txt").unwrap(),
        Fingerprint::of_bytes(b"hello"),
    );
    ledger
}

#[test]
fn test_torn_temp_write_leaves_ledger_intact() {
    let dir = tempdir().unwrap();
    let store = LedgerStore::at_backup_root(dir.path());
    store.save(&sample_ledger()).unwrap();

    // A crash mid-write leaves only a partial temp sibling behind.
    fs::write(temp_path_for(store.path()), b"{\"a.txt\": \"2cf2").unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded.status, LedgerStatus::Loaded);
    assert_eq!(loaded.ledger, sample_ledger());
}

#[test]
fn test_truncated_ledger_is_corrupt_and_quarantined() {
    let dir = tempdir().unwrap();
    let ledger_path = dir.path().join(LEDGER_FILE_NAME);
    fs::write(&ledger_path, b"{\"a.txt\": ").unwrap();
    let run = make_run(dir.path(), "run1", "hello");

    let outcome = track_run(&run, &TrackOptions::for_backup_root(dir.path()), None).unwrap();
    let TrackOutcome::Tracked(report) = outcome else {
        panic!("expected a tracked run");
    };

    assert!(matches!(report.ledger_status, LedgerStatus::Corrupt { .. }));
    assert_eq!(report.classification.new_count(), 1);

    let aside = dir.path().join(format!("{LEDGER_FILE_NAME}.corrupt"));
    assert_eq!(fs::read(&aside).unwrap(), b"{\"a.txt\": ");

    let fresh = LedgerStore::new(&ledger_path).load().unwrap();
    assert_eq!(fresh.status, LedgerStatus::Loaded);
    assert_eq!(fresh.ledger, sample_ledger());
}

#[test]
fn test_wrong_shape_is_corrupt() {
    let dir = tempdir().unwrap();
    let store = LedgerStore::at_backup_root(dir.path());
    for bad in ["[]", "{\"a.txt\": 5}", "{\"a.txt\": \"nothex\"}", "{\"../up\": \"\"}"] {
        fs::write(store.path(), bad).unwrap();
        let loaded = store.load().unwrap();
        assert!(
            matches!(loaded.status, LedgerStatus::Corrupt { .. }),
            "{bad} should be corrupt"
        );
        assert!(loaded.ledger.is_empty());
        assert!(loaded.is_first_run());
    }
}

#[test]
fn test_unreadable_ledger_aborts_before_save() {
    let dir = tempdir().unwrap();
    // A directory where the ledger file should be cannot be read as text.
    fs::create_dir(dir.path().join(LEDGER_FILE_NAME)).unwrap();
    let run = make_run(dir.path(), "run1", "hello");

    let err = track_run(&run, &TrackOptions::for_backup_root(dir.path()), None).unwrap_err();
    assert!(matches!(err, PipelineError::Ledger(_)));
    assert!(dir.path().join(LEDGER_FILE_NAME).is_dir());
}

#[cfg(unix)]
#[test]
fn test_manifest_failure_leaves_ledger_untouched() {
    let dir = tempdir().unwrap();
    let store = LedgerStore::at_backup_root(dir.path());
    store.save(&sample_ledger()).unwrap();
    let before = fs::read(store.path()).unwrap();

    let run = make_run(dir.path(), "run2", "changed");
    // The manifest cannot be renamed over a directory.
    fs::create_dir(run.join(MANIFEST_FILE_NAME)).unwrap();

    let err = track_run(&run, &TrackOptions::for_backup_root(dir.path()), None).unwrap_err();
    assert!(matches!(err, PipelineError::Manifest(_)));
    assert_eq!(fs::read(store.path()).unwrap(), before);
}
