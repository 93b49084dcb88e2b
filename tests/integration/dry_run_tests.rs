use super::common::{is_symlink, Workspace};
use linkdupe::dedup::RunPlan;
use std::fs;

#[test]
fn test_dry_run_changes_nothing_on_disk() {
    let ws = Workspace::new();
    let a = ws.write("a.txt", b"identical");
    let b = ws.write("b.txt", b"identical");
    let mut dedup = ws.dry_run_deduplicator();

    let summary = dedup.run(&RunPlan::full()).unwrap();
    dedup.close().unwrap();

    assert_eq!(summary.linked, vec![a.clone(), b.clone()]);
    assert_eq!(summary.pool_entries_created, 1);
    assert!(!is_symlink(&a));
    assert!(!is_symlink(&b));
    assert_eq!(fs::read(&a).unwrap(), b"identical");
    assert!(ws.pool_entries().is_empty());

    let real = dedup.into_storage().into_inner();
    assert!(real.file_records().unwrap_err().to_string().contains("closed"));
}

#[test]
fn test_dry_run_leaves_store_unchanged() {
    let ws = Workspace::new();
    ws.write("a.txt", b"identical");
    ws.write("b.txt", b"identical");
    let mut dedup = ws.dry_run_deduplicator();

    dedup.run(&RunPlan::full()).unwrap();

    let real = dedup.storage().true_storage();
    assert!(real.file_records().unwrap().is_empty());
    assert!(real.pool_records().unwrap().is_empty());
}

#[cfg(unix)]
#[test]
fn test_dry_run_decisions_match_real_run() {
    let ws = Workspace::new();
    ws.write("a.txt", b"one");
    ws.write("dir/b.txt", b"one");
    ws.write("dir/c.txt", b"two");
    ws.write("d.txt", b"two");
    ws.write("e.txt", b"three");
    ws.write("f.txt", b"one");

    let mut simulated = ws.dry_run_deduplicator();
    let dry = simulated.run(&RunPlan::full()).unwrap();
    simulated.close().unwrap();
    drop(simulated);

    let mut real = ws.deduplicator();
    let done = real.run(&RunPlan::full()).unwrap();

    assert_eq!(dry.linked, done.linked);
    assert_eq!(dry.pool_entries_created, done.pool_entries_created);
    assert_eq!(dry.bytes_deduplicated, done.bytes_deduplicated);
    assert_eq!(done.pool_entries_created, 2);
    assert_eq!(done.linked.len(), 5);
}

#[cfg(unix)]
#[test]
fn test_dry_run_sees_existing_pool_entries() {
    let ws = Workspace::new();
    ws.write("a.txt", b"pooled");
    ws.write("b.txt", b"pooled");
    let mut real = ws.deduplicator();
    real.run(&RunPlan::full()).unwrap();
    let files_before = real.storage().file_records().unwrap();
    let pool_before = real.storage().pool_records().unwrap();
    real.close().unwrap();
    drop(real);

    let c = ws.write("c.txt", b"pooled");
    let mut simulated = ws.dry_run_deduplicator();
    let summary = simulated.run(&RunPlan::full()).unwrap();

    // The existing entry is reused rather than a new one simulated
    assert_eq!(summary.pool_entries_created, 0);
    assert_eq!(summary.linked, vec![c.clone()]);
    assert!(!is_symlink(&c));

    let store = simulated.storage().true_storage();
    assert_eq!(store.file_records().unwrap(), files_before);
    assert_eq!(store.pool_records().unwrap(), pool_before);
}

#[cfg(unix)]
#[test]
fn test_dry_run_matches_real_run_when_stored_file_is_promoted() {
    let ws = Workspace::new();
    let c = ws.write("c.txt", b"dup content");
    let mut first = ws.deduplicator();
    first.run(&RunPlan::full()).unwrap();
    first.close().unwrap();
    drop(first);

    // Sorts before c.txt, so c.txt is promoted before the walk reaches it.
    let b = ws.write("b.txt", b"dup content");

    let mut simulated = ws.dry_run_deduplicator();
    let dry = simulated.run(&RunPlan::full()).unwrap();
    simulated.close().unwrap();
    drop(simulated);

    let mut real = ws.deduplicator();
    let done = real.run(&RunPlan::full()).unwrap();

    assert_eq!(done.linked, vec![c.clone(), b.clone()]);
    assert_eq!(dry.linked, done.linked);
    assert_eq!(dry.files_fingerprinted, done.files_fingerprinted);
    assert_eq!(dry.files_skipped, done.files_skipped);
    assert_eq!(dry.bytes_deduplicated, done.bytes_deduplicated);
    assert_eq!(done.files_fingerprinted, 1);
    assert_eq!(done.bytes_deduplicated, 11);
}
