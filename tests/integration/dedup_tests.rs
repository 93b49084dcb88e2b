use super::common::{is_symlink, Workspace};
use linkdupe::checksum::{available_algorithms, get_algorithm, Checksum, Crc32};
use linkdupe::dedup::{DedupError, Deduplicator, RunPlan};
use linkdupe::storage::SqliteMetadataStorage;
use std::fs;

#[cfg(unix)]
#[test]
fn test_identical_files_become_links_to_one_pool_entry() {
    let ws = Workspace::new();
    let a = ws.write("a.txt", b"hello world\n");
    let b = ws.write("b.txt", b"hello world\n");
    let mut dedup = ws.deduplicator();

    let summary = dedup.run(&RunPlan::full()).unwrap();

    let entries = ws.pool_entries();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(fs::read(entry).unwrap(), b"hello world\n");

    for path in [&a, &b] {
        assert!(is_symlink(path), "{} should be a link", path.display());
        assert_eq!(&fs::read_link(path).unwrap(), entry);
        assert_eq!(fs::read(path).unwrap(), b"hello world\n");
    }
    assert_eq!(summary.linked, vec![a.clone(), b.clone()]);
    assert_eq!(summary.pool_entries_created, 1);
    assert_eq!(summary.bytes_deduplicated, 12);

    let mut crc = Crc32::new();
    crc.update(b"hello world\n");
    let pool_records = dedup.storage().pool_records().unwrap();
    assert_eq!(pool_records.len(), 1);
    assert_eq!(pool_records[0].checksum, crc.digest());
    assert_eq!(&pool_records[0].path, entry);

    let file_records = dedup.storage().file_records().unwrap();
    assert_eq!(file_records.len(), 2);
    for record in &file_records {
        assert_eq!(record.file_size, None);
        assert_eq!(record.modified_date, None);
        assert_eq!(record.checksum, None);
        assert_eq!(record.pool_ref, Some(pool_records[0].id));
    }
}

#[cfg(unix)]
#[test]
fn test_duplicates_in_nested_directories() {
    let ws = Workspace::new();
    let content = b"nested duplicate content";
    let x = ws.write("a/x.bin", content);
    let y = ws.write("b/c/y.bin", content);
    let z = ws.write("z.bin", content);
    ws.write("b/unique.bin", b"something else");
    let mut dedup = ws.deduplicator();

    let summary = dedup.run(&RunPlan::full()).unwrap();

    assert_eq!(ws.pool_entries().len(), 1);
    assert_eq!(summary.linked, vec![x.clone(), y.clone(), z.clone()]);
    assert_eq!(summary.bytes_deduplicated, 2 * content.len() as u64);
    assert!(is_symlink(&x) && is_symlink(&y) && is_symlink(&z));
    assert!(!is_symlink(&ws.source.join("b/unique.bin")));
}

#[test]
fn test_distinct_files_are_left_alone() {
    let ws = Workspace::new();
    let a = ws.write("a.txt", b"first");
    let b = ws.write("b.txt", b"second");
    let mut dedup = ws.deduplicator();

    let summary = dedup.run(&RunPlan::full()).unwrap();

    assert!(summary.linked.is_empty());
    assert_eq!(summary.files_fingerprinted, 2);
    assert!(ws.pool_entries().is_empty());
    assert_eq!(fs::read(&a).unwrap(), b"first");
    assert_eq!(fs::read(&b).unwrap(), b"second");
}

#[cfg(unix)]
#[test]
fn test_later_duplicate_is_linked_without_new_pool_entry() {
    let ws = Workspace::new();
    ws.write("a.txt", b"shared");
    ws.write("b.txt", b"shared");
    let mut dedup = ws.deduplicator();
    dedup.run(&RunPlan::full()).unwrap();

    let c = ws.write("c.txt", b"shared");
    let summary = dedup.run(&RunPlan::files(vec![c.clone()])).unwrap();

    assert_eq!(summary.pool_entries_created, 0);
    assert_eq!(summary.linked, vec![c.clone()]);
    assert_eq!(summary.bytes_deduplicated, 6);
    assert_eq!(ws.pool_entries().len(), 1);
    assert!(is_symlink(&c));
}

#[test]
fn test_add_file_missing_path() {
    let ws = Workspace::new();
    let mut dedup = ws.deduplicator();
    let missing = ws.source.join("missing.txt");

    let result = dedup.run(&RunPlan::files(vec![missing.clone()]));

    match result {
        Err(DedupError::NotFound(path)) => assert_eq!(path, missing),
        other => panic!("Expected NotFound, got {:?}", other),
    }
}

#[test]
fn test_add_files_only_touches_given_files() {
    let ws = Workspace::new();
    let a = ws.write("a.txt", b"same");
    ws.write("b.txt", b"same");
    let mut dedup = ws.deduplicator();

    let summary = dedup.run(&RunPlan::files(vec![a])).unwrap();

    assert_eq!(summary.files_seen, 1);
    assert!(summary.linked.is_empty());
    assert_eq!(dedup.storage().file_records().unwrap().len(), 1);
}

#[test]
fn test_vanished_candidate_is_skipped() {
    let ws = Workspace::new();
    let a = ws.write("a.txt", b"same");
    let mut dedup = ws.deduplicator();
    dedup.add_file(&a).unwrap();

    fs::remove_file(&a).unwrap();
    let b = ws.write("b.txt", b"same");
    dedup.add_file(&b).unwrap();

    assert!(dedup.summary().linked.is_empty());
    assert!(ws.pool_entries().is_empty());
    assert_eq!(fs::read(&b).unwrap(), b"same");
}

#[cfg(unix)]
#[test]
fn test_pool_inside_source_tree_is_not_walked() {
    let ws = Workspace::new();
    ws.write("a.txt", b"inside");
    ws.write("b.txt", b"inside");
    let pool = ws.source.join(".symlinks");
    let storage = SqliteMetadataStorage::open(&pool).unwrap();
    let config = linkdupe::dedup::DedupConfig::new(&ws.source, &pool);
    let mut dedup = Deduplicator::new(config, storage).unwrap();

    let first = dedup.run(&RunPlan::full()).unwrap();
    let second = dedup.run(&RunPlan::full()).unwrap();

    assert_eq!(first.linked.len(), 2);
    assert_eq!(second.files_fingerprinted, 0);
    assert!(second.linked.is_empty());
    assert_eq!(dedup.storage().file_records().unwrap().len(), 2);
}

#[cfg(unix)]
#[test]
fn test_every_algorithm_deduplicates() {
    for name in available_algorithms() {
        let ws = Workspace::new();
        let a = ws.write("a.bin", &[0xAB; 5000]);
        let b = ws.write("b.bin", &[0xAB; 5000]);
        let storage = SqliteMetadataStorage::open(&ws.pool).unwrap();
        let config = ws
            .config()
            .with_algorithm(get_algorithm(name).unwrap())
            .with_chunk_size(777);
        let mut dedup = Deduplicator::new(config, storage).unwrap();

        let summary = dedup.run(&RunPlan::full()).unwrap();

        assert_eq!(summary.linked, vec![a.clone(), b.clone()], "algorithm {name}");
        assert_eq!(ws.pool_entries().len(), 1, "algorithm {name}");
    }
}

#[test]
fn test_close_is_idempotent() {
    let ws = Workspace::new();
    ws.write("a.txt", b"content");
    let mut dedup = ws.deduplicator();
    dedup.close().unwrap();
    dedup.close().unwrap();
    assert!(dedup.run(&RunPlan::full()).is_err());
}
