use super::common::Workspace;
use filetime::FileTime;
use linkdupe::dedup::RunPlan;
use std::fs;

fn pool_only() -> RunPlan {
    RunPlan {
        add_files: Vec::new(),
        index_sources: false,
        index_pool: true,
    }
}

#[cfg(unix)]
#[test]
fn test_pool_reindex_without_changes_is_a_noop() {
    let ws = Workspace::new();
    ws.write("a.txt", b"pooled");
    ws.write("b.txt", b"pooled");
    let mut dedup = ws.deduplicator();
    dedup.run(&RunPlan::full()).unwrap();
    let before = dedup.storage().pool_records().unwrap();

    let first = dedup.run(&pool_only()).unwrap();
    let second = dedup.run(&pool_only()).unwrap();

    assert_eq!(first.files_fingerprinted, 0);
    assert_eq!(second.files_fingerprinted, 0);
    assert_eq!(first.files_seen, 1);
    assert_eq!(dedup.storage().pool_records().unwrap(), before);
}

#[cfg(unix)]
#[test]
fn test_changed_pool_entry_is_reindexed() {
    let ws = Workspace::new();
    ws.write("a.txt", b"pooled");
    ws.write("b.txt", b"pooled");
    let mut dedup = ws.deduplicator();
    dedup.run(&RunPlan::full()).unwrap();
    let before = dedup.storage().pool_records().unwrap();

    let entry = &ws.pool_entries()[0];
    fs::write(entry, b"rewritten pool entry").unwrap();
    filetime::set_file_mtime(entry, FileTime::from_unix_time(1_650_000_000, 0)).unwrap();
    let summary = dedup.run(&pool_only()).unwrap();

    assert_eq!(summary.files_fingerprinted, 1);
    let after = dedup.storage().pool_records().unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].id, before[0].id);
    assert_ne!(after[0].checksum, before[0].checksum);
    assert_eq!(after[0].file_size, 20);
    assert_eq!(after[0].modified_date, 1_650_000_000);
}

#[test]
fn test_unrecorded_pool_file_is_not_indexed() {
    let ws = Workspace::new();
    let mut dedup = ws.deduplicator();
    fs::write(ws.pool.join("stray"), b"not created by a promotion").unwrap();

    let summary = dedup.run(&pool_only()).unwrap();

    assert_eq!(summary.files_seen, 1);
    assert_eq!(summary.files_skipped, 1);
    assert_eq!(summary.files_fingerprinted, 0);
    assert!(dedup.storage().pool_records().unwrap().is_empty());
}

#[test]
fn test_partial_copies_and_database_are_ignored() {
    let ws = Workspace::new();
    let mut dedup = ws.deduplicator();
    fs::write(ws.pool.join(".abc.partial"), b"half").unwrap();

    let summary = dedup.run(&pool_only()).unwrap();

    assert_eq!(summary.files_seen, 0);
}

#[test]
fn test_pool_reindex_runs_before_source_index() {
    let ws = Workspace::new();
    ws.write("a.txt", b"x");
    let mut dedup = ws.deduplicator();
    fs::write(ws.pool.join("stray"), b"y").unwrap();

    let summary = dedup.run(&RunPlan::full()).unwrap();

    // One pool file and one source file
    assert_eq!(summary.files_seen, 2);
    assert_eq!(summary.files_fingerprinted, 1);
}
