use chrono::Local;
use snapledger::actions::{
    execute, plan, PlanDecision, ReclaimConfig, ReclaimOutcome, ReclaimPlan, CONFIRMATION_TOKEN,
};
use snapledger::duplicates::classify;
use snapledger::ledger::Ledger;
use snapledger::manifest::Manifest;
use snapledger::pipeline::{track_run, TrackOptions, TrackOutcome};
use std::fs;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

/// Two runs with identical `keep/a.jpg` and `keep/b.jpg`; returns the plan
/// for the second.
fn second_run_plan() -> (TempDir, PathBuf, ReclaimPlan) {
    let root = tempdir().unwrap();
    let options = TrackOptions::for_backup_root(root.path());
    let mut last = None;
    for name in ["run1", "run2"] {
        let run = root.path().join(name);
        fs::create_dir_all(run.join("keep")).unwrap();
        fs::write(run.join("keep/a.jpg"), "aaaa").unwrap();
        fs::write(run.join("keep/b.jpg"), "bbbbbbbb").unwrap();
        last = Some(track_run(&run, &options, None).unwrap());
    }
    let Some(TrackOutcome::Tracked(report)) = last else {
        panic!("expected a tracked run");
    };
    let plan = report.plan.expect("unchanged files should be planned");
    (root, report.run_dir, plan)
}

fn run_plan(plan: &ReclaimPlan, token: &str, config: &ReclaimConfig) -> ReclaimOutcome {
    execute::<()>(plan, token, config, None)
}

#[test]
fn test_empty_candidate_set_is_noop() {
    let root = tempdir().unwrap();
    let run = root.path().join("run1");
    fs::create_dir_all(&run).unwrap();
    fs::write(run.join("a.txt"), "hello").unwrap();

    let scan = snapledger::scanner::SnapshotScanner::new(&run)
        .scan(None)
        .unwrap();
    let manifest = Manifest::from_scan(&run, &scan);
    let classification = classify(&manifest, &Ledger::new());

    assert!(matches!(
        plan(&classification, Local::now()),
        PlanDecision::NothingToReclaim
    ));
    assert!(run.join("a.txt").exists());
}

#[test]
fn test_execute_removes_planned_files() {
    let (_root, run, plan) = second_run_plan();
    assert_eq!(plan.len(), 2);
    assert_eq!(plan.total_bytes(), 12);

    let ReclaimOutcome::Executed(result) =
        run_plan(&plan, CONFIRMATION_TOKEN, &ReclaimConfig::default())
    else {
        panic!("expected execution");
    };

    assert!(result.all_succeeded());
    assert_eq!(result.success_count(), 2);
    assert_eq!(result.bytes_freed, 12);
    assert!(!run.join("keep/a.jpg").exists());
    assert!(!run.join("keep/b.jpg").exists());
    // The manifest is not part of the plan.
    assert!(run.join(snapledger::manifest::MANIFEST_FILE_NAME).exists());
}

#[test]
fn test_wrong_confirmation_touches_nothing() {
    let (_root, run, plan) = second_run_plan();

    for token in ["", "delete", "DELETE ", "yes", "y"] {
        let outcome = run_plan(&plan, token, &ReclaimConfig::default());
        assert!(matches!(outcome, ReclaimOutcome::Aborted), "{token:?}");
    }
    assert!(run.join("keep/a.jpg").exists());
    assert!(run.join("keep/b.jpg").exists());
}

#[test]
fn test_missing_file_reported_not_failed() {
    let (_root, run, plan) = second_run_plan();
    fs::remove_file(run.join("keep/a.jpg")).unwrap();

    let ReclaimOutcome::Executed(result) =
        run_plan(&plan, CONFIRMATION_TOKEN, &ReclaimConfig::default())
    else {
        panic!("expected execution");
    };

    assert_eq!(result.missing, vec![run.join("keep/a.jpg")]);
    assert_eq!(result.success_count(), 1);
    assert!(result.all_succeeded());
}

#[test]
fn test_resized_file_is_kept() {
    let (_root, run, plan) = second_run_plan();
    fs::write(run.join("keep/a.jpg"), "a new, longer photo").unwrap();

    let ReclaimOutcome::Executed(result) =
        run_plan(&plan, CONFIRMATION_TOKEN, &ReclaimConfig::default())
    else {
        panic!("expected execution");
    };

    assert_eq!(result.failure_count(), 1);
    assert_eq!(result.success_count(), 1);
    assert!(run.join("keep/a.jpg").exists());
    assert!(!run.join("keep/b.jpg").exists());
}

#[test]
fn test_verify_catches_same_size_edit() {
    let (_root, run, plan) = second_run_plan();
    fs::write(run.join("keep/a.jpg"), "zzzz").unwrap();

    let config = ReclaimConfig::default().with_verify_content(true);
    let ReclaimOutcome::Executed(result) = run_plan(&plan, CONFIRMATION_TOKEN, &config) else {
        panic!("expected execution");
    };

    assert_eq!(result.failure_count(), 1);
    assert!(run.join("keep/a.jpg").exists());
}

#[test]
fn test_plan_entry_outside_run_is_refused() {
    let (root, _run, mut plan) = second_run_plan();
    let outside = root.path().join("run1").join("keep/a.jpg");
    plan.entries[0].path = outside.clone();

    let ReclaimOutcome::Executed(result) =
        run_plan(&plan, CONFIRMATION_TOKEN, &ReclaimConfig::default())
    else {
        panic!("expected execution");
    };

    assert_eq!(result.failure_count(), 1);
    assert!(outside.exists());
}

#[cfg(unix)]
#[test]
fn test_symlinked_parent_is_refused() {
    let (root, run, plan) = second_run_plan();
    let elsewhere = root.path().join("elsewhere");
    fs::create_dir_all(&elsewhere).unwrap();
    fs::write(elsewhere.join("a.jpg"), "aaaa").unwrap();
    fs::write(elsewhere.join("b.jpg"), "bbbbbbbb").unwrap();

    fs::remove_dir_all(run.join("keep")).unwrap();
    std::os::unix::fs::symlink(&elsewhere, run.join("keep")).unwrap();

    let ReclaimOutcome::Executed(result) =
        run_plan(&plan, CONFIRMATION_TOKEN, &ReclaimConfig::default())
    else {
        panic!("expected execution");
    };

    assert_eq!(result.failure_count(), 2);
    assert!(elsewhere.join("a.jpg").exists());
    assert!(elsewhere.join("b.jpg").exists());
}
