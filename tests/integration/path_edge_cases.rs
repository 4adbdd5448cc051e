use snapledger::ledger::LedgerStore;
use snapledger::manifest::Manifest;
use snapledger::pipeline::{track_run, TrackOptions, TrackOutcome, TrackReport};
use snapledger::scanner::{RelativePath, SnapshotScanner};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn track(root: &Path, run: &Path) -> Box<TrackReport> {
    match track_run(run, &TrackOptions::for_backup_root(root), None).unwrap() {
        TrackOutcome::Tracked(report) => report,
        TrackOutcome::NothingToClassify { .. } => panic!("nothing to classify"),
    }
}

#[test]
fn test_nfd_names_key_as_nfc() {
    let dir = tempdir().unwrap();
    // "cafe" + combining acute accent
    let nfd = "cafe\u{301}.jpg";
    fs::write(dir.path().join(nfd), "pixels").unwrap();

    let scan = SnapshotScanner::new(dir.path()).scan(None).unwrap();
    assert_eq!(scan.entries.len(), 1);
    assert_eq!(scan.entries[0].relative_path.as_str(), "caf\u{e9}.jpg");
    assert_eq!(scan.entries[0].path, dir.path().join(nfd));
}

#[test]
fn test_unicode_and_spaces_survive_manifest() {
    let root = tempdir().unwrap();
    let run = root.path().join("run1");
    let names = ["My Photos/día de playa.jpg", "日本/写真 1.png", "it's \"quoted\".txt"];
    for name in names {
        let path = run.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, name).unwrap();
    }

    track(root.path(), &run);

    let manifest = Manifest::read(&run).unwrap();
    assert_eq!(manifest.len(), 3);
    for name in names {
        let key = RelativePath::parse(name).unwrap();
        assert!(manifest.get(&key).is_some(), "{name} missing from manifest");
    }
    let ledger = LedgerStore::at_backup_root(root.path()).load().unwrap().ledger;
    assert_eq!(ledger.len(), 3);
}

#[test]
fn test_deeply_nested_paths() {
    let root = tempdir().unwrap();
    let run = root.path().join("run1");
    let deep = run.join("a/b/c/d/e/f/g/h");
    fs::create_dir_all(&deep).unwrap();
    fs::write(deep.join("leaf.txt"), "leaf").unwrap();

    let report = track(root.path(), &run);
    assert_eq!(
        report.classification.files[0].relative_path.as_str(),
        "a/b/c/d/e/f/g/h/leaf.txt"
    );
    assert_eq!(report.classification.files[0].path, deep.join("leaf.txt"));
}

#[test]
fn test_nested_manifest_name_is_hashed() {
    let root = tempdir().unwrap();
    let run = root.path().join("run1");
    fs::create_dir_all(run.join("sub")).unwrap();
    fs::write(run.join("sub/manifest.sha256"), "user data").unwrap();

    let report = track(root.path(), &run);
    assert_eq!(
        report.classification.files[0].relative_path.as_str(),
        "sub/manifest.sha256"
    );
}

#[cfg(unix)]
#[test]
fn test_symlinks_are_skipped() {
    let root = tempdir().unwrap();
    let run = root.path().join("run1");
    fs::create_dir_all(&run).unwrap();
    fs::write(run.join("real.txt"), "real").unwrap();
    std::os::unix::fs::symlink(run.join("real.txt"), run.join("link.txt")).unwrap();
    std::os::unix::fs::symlink("/definitely/not/there", run.join("dangling")).unwrap();

    let report = track(root.path(), &run);

    assert_eq!(report.classification.files.len(), 1);
    assert_eq!(report.ignored_entries.len(), 2);
    assert!(!report.is_partial());
}

#[cfg(unix)]
#[test]
fn test_line_break_in_name_is_skipped() {
    let root = tempdir().unwrap();
    let run = root.path().join("run1");
    fs::create_dir_all(&run).unwrap();
    fs::write(run.join("fine.txt"), "ok").unwrap();
    fs::write(run.join("bad\nname.txt"), "nope").unwrap();

    let report = track(root.path(), &run);

    assert_eq!(report.classification.files.len(), 1);
    assert!(report.is_partial());
    let text = fs::read_to_string(&report.manifest_path).unwrap();
    assert_eq!(text.lines().count(), 1);
}
