use super::common::{is_symlink, Workspace};
use clap::Parser;
use linkdupe::cli::Cli;
use linkdupe::error::ExitCode;
use linkdupe::run_app;

fn run(args: &[&str]) -> anyhow::Result<ExitCode> {
    let mut argv = vec!["linkdupe"];
    argv.extend_from_slice(args);
    run_app(Cli::try_parse_from(argv).unwrap())
}

fn s(path: &std::path::Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_no_work_to_do() {
    let ws = Workspace::new();
    let err = run(&["dedup", s(&ws.source), "--no-index", "--no-symlink-index"]).unwrap_err();
    assert!(err.to_string().contains("No work to do"));
}

#[test]
fn test_missing_source_folder() {
    let ws = Workspace::new();
    let missing = ws.source.join("nope");
    let err = run(&["dedup", s(&missing), "--symlink-folder", s(&ws.pool)]).unwrap_err();
    assert!(err.to_string().contains("Not a directory"));
}

#[test]
fn test_pool_folder_is_a_file() {
    let ws = Workspace::new();
    let blocker = ws.write("blocker", b"file");
    let err = run(&["dedup", s(&ws.source), "--symlink-folder", s(&blocker)]).unwrap_err();
    assert!(err.to_string().contains("Could not create directory"));
}

#[cfg(unix)]
#[test]
fn test_dedup_command_links_duplicates() {
    let ws = Workspace::new();
    let a = ws.write("a.txt", b"cli duplicate");
    let b = ws.write("b.txt", b"cli duplicate");

    let code = run(&[
        "-q",
        "dedup",
        s(&ws.source),
        "--symlink-folder",
        s(&ws.pool),
        "--checksum-algo",
        "crc32",
    ])
    .unwrap();

    assert_eq!(code, ExitCode::Success);
    assert!(is_symlink(&a));
    assert!(is_symlink(&b));
    assert_eq!(ws.pool_entries().len(), 1);
}

#[test]
fn test_dry_run_command_creates_no_pool() {
    let ws = Workspace::new();
    let a = ws.write("a.txt", b"cli duplicate");
    ws.write("b.txt", b"cli duplicate");

    let code = run(&[
        "-q",
        "dedup",
        s(&ws.source),
        "--symlink-folder",
        s(&ws.pool),
        "--dry-run",
    ])
    .unwrap();

    assert_eq!(code, ExitCode::Success);
    assert!(!ws.pool.exists());
    assert!(!is_symlink(&a));
}

#[test]
fn test_add_file_command() {
    let ws = Workspace::new();
    let a = ws.write("a.txt", b"only me");

    let code = run(&[
        "-q",
        "dedup",
        s(&ws.source),
        "--symlink-folder",
        s(&ws.pool),
        "--add-file",
        s(&a),
    ])
    .unwrap();

    assert_eq!(code, ExitCode::Success);
    assert!(ws.pool.join("data.sqlite3").is_file());
}

#[test]
fn test_checksum_command() {
    let ws = Workspace::new();
    let a = ws.write("a.txt", b"123456789");
    let code = run(&["checksum", s(&a), "--algo", "adler32", "--hex-only"]).unwrap();
    assert_eq!(code, ExitCode::Success);
}

#[test]
fn test_checksum_command_rejects_directories() {
    let ws = Workspace::new();
    let err = run(&["checksum", s(&ws.source)]).unwrap_err();
    assert!(err.to_string().starts_with("Not a file"));
}
