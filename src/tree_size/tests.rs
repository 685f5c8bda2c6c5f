use super::*;
#[cfg(unix)]
use crate::test_support::make_fifo;
use crate::test_support::{uniq_path, write_file};
use std::fs;

#[test]
fn regular_file_counts_its_length() {
    let base = uniq_path("size-file");
    write_file(&base.join("f"), &[0u8; 42]);
    assert_eq!(total_bytes(&base.join("f")).unwrap(), 42);
    let _ = fs::remove_dir_all(&base);
}

#[test]
fn directory_sums_nested_children() {
    let base = uniq_path("size-dir");
    write_file(&base.join("A/x"), &[1u8; 10]);
    write_file(&base.join("A/y"), &[2u8; 20]);
    write_file(&base.join("A/sub/z"), &[3u8; 5]);
    fs::create_dir_all(base.join("A/empty")).unwrap();
    assert_eq!(total_bytes(&base.join("A")).unwrap(), 35);
    let _ = fs::remove_dir_all(&base);
}

#[test]
fn missing_path_is_zero() {
    let base = uniq_path("size-missing");
    assert_eq!(total_bytes(&base.join("nothing")).unwrap(), 0);
}

#[cfg(unix)]
#[test]
fn symlinks_count_zero_and_are_not_followed() {
    let base = uniq_path("size-link");
    write_file(&base.join("big"), &[0u8; 100]);
    fs::create_dir_all(base.join("dir")).unwrap();
    std::os::unix::fs::symlink(base.join("big"), base.join("dir/link")).unwrap();
    // a cycle must not hang the walk
    std::os::unix::fs::symlink(&base, base.join("dir/loop")).unwrap();

    assert_eq!(total_bytes(&base.join("dir/link")).unwrap(), 0);
    assert_eq!(total_bytes(&base.join("dir")).unwrap(), 0);
    let _ = fs::remove_dir_all(&base);
}

#[cfg(unix)]
#[test]
fn fifo_is_unsupported() {
    let base = uniq_path("size-fifo");
    make_fifo(&base.join("pipe"));

    let err = total_bytes(&base).unwrap_err();
    assert_eq!(err.code(), FileOpErrorCode::UnsupportedType);
    let _ = fs::remove_dir_all(&base);
}

#[cfg(unix)]
#[test]
fn size_sources_turns_failures_into_warnings() {
    let base = uniq_path("size-report");
    write_file(&base.join("a"), &[0u8; 7]);
    make_fifo(&base.join("weird/pipe"));

    let sources = vec![base.join("a"), base.join("weird"), base.join("gone")];
    let report = size_sources(&sources, None).unwrap();
    assert_eq!(report.per_source, vec![7, 0, 0]);
    assert_eq!(report.total, 7);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].code(), FileOpErrorCode::UnsupportedType);
    let _ = fs::remove_dir_all(&base);
}

#[test]
fn size_sources_stops_on_cancel() {
    let base = uniq_path("size-cancel");
    write_file(&base.join("a"), b"abc");
    let cancel = AtomicBool::new(true);
    let err = size_sources(&[base.join("a")], Some(&cancel)).unwrap_err();
    assert!(err.is_cancelled());
    let _ = fs::remove_dir_all(&base);
}
