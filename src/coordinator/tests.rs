use super::*;
use crate::test_support::{uniq_path, write_file};
use std::sync::Mutex;
use std::time::Duration;

fn coordinator(base: &Path) -> OperationCoordinator {
    OperationCoordinator::new(EngineConfig {
        trash_dir: base.join("trash"),
        log_dir: base.join("logs"),
        progress_interval_ms: 0,
        ..EngineConfig::default()
    })
}

fn next_conflict(handle: &mut TransferHandle) -> crate::conflict::ConflictRequest {
    loop {
        match handle.next_event_blocking() {
            Some(EngineEvent::Conflict(request)) => return request,
            Some(EngineEvent::Progress { .. }) => continue,
            other => panic!("expected a conflict, got {other:?}"),
        }
    }
}

fn wait_until_idle(coord: &OperationCoordinator) {
    for _ in 0..500 {
        if !coord.is_busy() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("coordinator stayed busy");
}

#[derive(Default)]
struct Recorder(Mutex<Vec<(u64, u64)>>);

impl ProgressSink for Recorder {
    fn on_progress(&self, done: u64, total: u64) {
        self.0.lock().unwrap().push((done, total));
    }
}

#[cfg(unix)]
fn cross_device_rename(_src: &Path, _dest: &Path) -> std::io::Result<()> {
    Err(std::io::Error::from_raw_os_error(libc::EXDEV))
}

#[test]
fn copy_reports_progress_and_success() {
    let base = uniq_path("coord-copy");
    write_file(&base.join("A/x"), &[1u8; 10]);
    write_file(&base.join("A/y"), &[2u8; 20]);
    fs::create_dir_all(base.join("B")).unwrap();
    let coord = coordinator(&base);

    let handle = coord
        .start_transfer(TransferRequest::new(
            vec![base.join("A")],
            base.join("B"),
            TransferKind::Copy,
        ))
        .unwrap();
    let recorder = Recorder::default();
    let outcome = handle
        .drive(&recorder, &FixedResolver(ConflictDecision::Cancel))
        .unwrap();

    assert!(outcome.success, "{outcome:?}");
    assert!(!outcome.clear_clipboard);
    let seen = recorder.0.lock().unwrap().clone();
    assert_eq!(seen.first(), Some(&(0, 30)));
    assert_eq!(seen.last(), Some(&(30, 30)));
    assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(fs::read(base.join("B/A/y")).unwrap(), vec![2u8; 20]);
    assert!(!coord.is_busy());

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn second_request_is_rejected_while_busy() {
    let base = uniq_path("coord-busy");
    write_file(&base.join("src/g"), b"new");
    write_file(&base.join("dst/g"), b"old");
    let coord = coordinator(&base);

    let mut handle = coord
        .start_transfer(TransferRequest::new(
            vec![base.join("src/g")],
            base.join("dst"),
            TransferKind::Copy,
        ))
        .unwrap();
    let conflict = next_conflict(&mut handle);
    assert!(coord.is_busy());

    let err = coord
        .start_delete(vec![base.join("src/g")])
        .err()
        .unwrap();
    assert_eq!(err.code(), CoordinatorErrorCode::Busy);

    conflict.respond(ConflictDecision::Skip);
    let outcome = handle.wait().unwrap();
    assert!(outcome.success);
    assert_eq!(fs::read(base.join("dst/g")).unwrap(), b"old");

    // slot is free again once the outcome is out
    let again = coord
        .start_transfer(TransferRequest::new(
            vec![base.join("src/g")],
            base.join("dst"),
            TransferKind::Copy,
        ))
        .unwrap();
    let outcome = again.wait().unwrap();
    assert!(outcome.cancelled);

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn scripted_resolver_answers_each_conflict() {
    let base = uniq_path("coord-scripted");
    for name in ["a", "b", "c"] {
        write_file(&base.join("src").join(name), name.as_bytes());
        write_file(&base.join("dst").join(name), b"existing");
    }
    let coord = coordinator(&base);

    let asked = Mutex::new(Vec::new());
    let resolver = |_: &Path, dest: &Path, _: bool| {
        let name = dest.file_name().unwrap().to_string_lossy().into_owned();
        asked.lock().unwrap().push(name.clone());
        match name.as_str() {
            "a" => ConflictDecision::Replace,
            "b" => ConflictDecision::Skip,
            _ => ConflictDecision::KeepBoth,
        }
    };
    let handle = coord
        .start_transfer(TransferRequest::new(
            vec![base.join("src/a"), base.join("src/b"), base.join("src/c")],
            base.join("dst"),
            TransferKind::Copy,
        ))
        .unwrap();
    let outcome = handle.drive(&NoProgress, &resolver).unwrap();

    assert!(outcome.success);
    assert_eq!(asked.lock().unwrap().as_slice(), &["a", "b", "c"]);
    assert_eq!(fs::read(base.join("dst/a")).unwrap(), b"a");
    assert_eq!(fs::read(base.join("dst/b")).unwrap(), b"existing");
    assert_eq!(fs::read(base.join("dst/c (copy)")).unwrap(), b"c");

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn dropping_the_handle_cancels_pending_conflict() {
    let base = uniq_path("coord-drop");
    write_file(&base.join("src/g"), b"1");
    write_file(&base.join("dst/g"), b"2");
    let coord = coordinator(&base);

    let handle = coord
        .start_transfer(TransferRequest::new(
            vec![base.join("src/g")],
            base.join("dst"),
            TransferKind::Move,
        ))
        .unwrap();
    drop(handle);

    wait_until_idle(&coord);
    assert_eq!(fs::read(base.join("dst/g")).unwrap(), b"2");
    assert!(base.join("src/g").exists());

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn cancel_by_id_interrupts_conflict_wait() {
    let base = uniq_path("coord-cancel-id");
    write_file(&base.join("src/g"), b"1");
    write_file(&base.join("dst/g"), b"2");
    let coord = coordinator(&base);

    let mut handle = coord
        .start_transfer(TransferRequest::new(
            vec![base.join("src/g")],
            base.join("dst"),
            TransferKind::Copy,
        ))
        .unwrap();
    let pending = next_conflict(&mut handle);
    coord.cancel(handle.id()).unwrap();

    let outcome = handle.wait().unwrap();
    drop(pending);
    assert!(outcome.cancelled);
    assert!(!outcome.success);
    assert_eq!(
        outcome.errors.last().map(|e| e.message.as_str()),
        Some("Operation cancelled.")
    );
    assert_eq!(outcome.first_error_code(), Some("operation_cancelled"));

    let err = coord.cancel("copy-999").unwrap_err();
    assert_eq!(err.code(), CoordinatorErrorCode::TaskNotFound);

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn failing_source_does_not_stop_the_rest() {
    let base = uniq_path("coord-partial");
    write_file(&base.join("src/good"), b"ok");
    fs::create_dir_all(base.join("dst")).unwrap();
    let coord = coordinator(&base);

    let outcome = coord
        .start_transfer(TransferRequest::new(
            vec![base.join("src/ghost"), base.join("src/good")],
            base.join("dst"),
            TransferKind::Copy,
        ))
        .unwrap()
        .wait()
        .unwrap();

    assert!(!outcome.success);
    assert!(!outcome.cancelled);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].code, "path_not_found");
    assert!(base.join("dst/good").exists());

    let _ = fs::remove_dir_all(&base);
}

#[cfg(unix)]
#[test]
fn cross_device_move_through_coordinator() {
    let base = uniq_path("coord-exdev");
    write_file(&base.join("src/tree/f"), &[5u8; 300]);
    fs::create_dir_all(base.join("dst")).unwrap();
    let coord = coordinator(&base).with_rename(cross_device_rename);

    let outcome = coord
        .start_transfer(TransferRequest::new(
            vec![base.join("src/tree")],
            base.join("dst"),
            TransferKind::Move,
        ))
        .unwrap()
        .wait()
        .unwrap();

    assert!(outcome.success, "{outcome:?}");
    assert!(outcome.clear_clipboard);
    assert!(!base.join("src/tree").exists());
    assert_eq!(fs::read(base.join("dst/tree/f")).unwrap(), vec![5u8; 300]);

    let _ = fs::remove_dir_all(&base);
}

#[cfg(unix)]
#[test]
fn unsizable_source_is_a_warning_and_still_moves() {
    let base = uniq_path("coord-fifo-move");
    write_file(&base.join("S/a"), b"abc");
    crate::test_support::make_fifo(&base.join("S/pipe"));
    fs::create_dir_all(base.join("D")).unwrap();
    let coord = coordinator(&base);

    let outcome = coord
        .start_transfer(TransferRequest::new(
            vec![base.join("S")],
            base.join("D"),
            TransferKind::Move,
        ))
        .unwrap()
        .wait()
        .unwrap();

    assert!(outcome.success, "{outcome:?}");
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].code, "unsupported_type");
    assert!(outcome.clear_clipboard);
    assert!(!base.join("S").exists());
    assert_eq!(fs::read(base.join("D/S/a")).unwrap(), b"abc");

    let _ = fs::remove_dir_all(&base);
}

#[cfg(unix)]
#[test]
fn unsizable_source_that_fails_is_reported_once() {
    let base = uniq_path("coord-fifo-copy");
    write_file(&base.join("S/a"), b"abc");
    crate::test_support::make_fifo(&base.join("S/pipe"));
    fs::create_dir_all(base.join("D")).unwrap();
    let coord = coordinator(&base);

    let outcome = coord
        .start_transfer(TransferRequest::new(
            vec![base.join("S")],
            base.join("D"),
            TransferKind::Copy,
        ))
        .unwrap()
        .wait()
        .unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].code, "unsupported_type");
    assert_eq!(outcome.warnings.len(), 1);
    assert!(base.join("S/a").exists());

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn cut_and_paste_clears_clipboard() {
    let base = uniq_path("coord-cut");
    write_file(&base.join("src/f.txt"), b"moving");
    fs::create_dir_all(base.join("dst")).unwrap();
    let coord = coordinator(&base);

    coord
        .set_clipboard(vec![base.join("src/f.txt")], ClipboardMode::Cut)
        .unwrap();
    assert_eq!(coord.clipboard().unwrap().unwrap().mode, ClipboardMode::Cut);
    assert!(coord.paste_preview(&base.join("dst")).unwrap().is_empty());

    let outcome = coord.paste(&base.join("dst")).unwrap().wait().unwrap();
    assert!(outcome.success);
    assert!(outcome.clear_clipboard);
    assert!(coord.clipboard().unwrap().is_none());
    assert!(!base.join("src/f.txt").exists());
    assert_eq!(fs::read(base.join("dst/f.txt")).unwrap(), b"moving");

    let err = coord.paste(&base.join("dst")).err().unwrap();
    assert_eq!(err.code(), CoordinatorErrorCode::InvalidRequest);

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn copy_paste_keeps_clipboard_and_previews_conflicts() {
    let base = uniq_path("coord-copy-paste");
    write_file(&base.join("src/f.txt"), b"copy me");
    write_file(&base.join("src/d/inner"), b"i");
    fs::create_dir_all(base.join("dst/d")).unwrap();
    let coord = coordinator(&base);

    coord
        .set_clipboard(
            vec![base.join("src/f.txt"), base.join("src/d")],
            ClipboardMode::Copy,
        )
        .unwrap();
    let preview = coord.paste_preview(&base.join("dst")).unwrap();
    assert_eq!(preview.len(), 1);
    assert!(preview[0].is_dir);
    assert!(!preview[0].same_path);

    let same_folder = coord.paste_preview(&base.join("src")).unwrap();
    assert_eq!(same_folder.len(), 2);
    assert!(same_folder.iter().all(|c| c.same_path));

    let outcome = coord
        .paste(&base.join("dst"))
        .unwrap()
        .drive(&NoProgress, &FixedResolver(ConflictDecision::Skip))
        .unwrap();
    assert!(outcome.success);
    assert!(!outcome.clear_clipboard);
    assert_eq!(coord.clipboard().unwrap().unwrap().entries.len(), 2);
    assert!(base.join("dst/f.txt").exists());
    assert!(!base.join("dst/d/inner").exists());

    coord.set_clipboard(Vec::new(), ClipboardMode::Copy).unwrap();
    assert!(coord.clipboard().unwrap().is_none());

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn paste_into_own_folder_is_skipped() {
    let base = uniq_path("coord-same-folder");
    write_file(&base.join("src/f"), b"same");
    let coord = coordinator(&base);

    coord
        .set_clipboard(vec![base.join("src/f")], ClipboardMode::Copy)
        .unwrap();
    let recorder = Recorder::default();
    let outcome = coord
        .paste(&base.join("src"))
        .unwrap()
        .drive(&recorder, &FixedResolver(ConflictDecision::Cancel))
        .unwrap();

    assert!(outcome.success);
    assert_eq!(recorder.0.lock().unwrap().last(), Some(&(4, 4)));
    assert_eq!(fs::read_dir(base.join("src")).unwrap().count(), 1);

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn invalid_requests_are_refused_up_front() {
    let base = uniq_path("coord-invalid");
    write_file(&base.join("file"), b"f");
    let coord = coordinator(&base);

    let cases = vec![
        TransferRequest::new(Vec::new(), base.clone(), TransferKind::Copy),
        TransferRequest::new(vec![PathBuf::from("relative")], base.clone(), TransferKind::Copy),
        TransferRequest::new(vec![base.join("file")], base.join("file"), TransferKind::Copy),
        TransferRequest::new(vec![base.join("file")], base.join("missing"), TransferKind::Move),
    ];
    for request in cases {
        let err = coord.start_transfer(request).err().unwrap();
        assert_eq!(err.code(), CoordinatorErrorCode::InvalidRequest);
    }
    assert!(coord.start_trash(Vec::new()).is_err());
    assert!(!coord.is_busy());

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn trash_and_restore_batches_count_items() {
    let base = uniq_path("coord-trash");
    write_file(&base.join("docs/a.txt"), b"a");
    write_file(&base.join("docs/b.txt"), b"b");
    let coord = coordinator(&base);

    let recorder = Recorder::default();
    let outcome = coord
        .start_trash(vec![base.join("docs/a.txt"), base.join("docs/b.txt")])
        .unwrap()
        .drive(&recorder, &FixedResolver(ConflictDecision::Cancel))
        .unwrap();
    assert!(outcome.success, "{outcome:?}");
    assert!(outcome.warnings.is_empty());
    assert_eq!(
        recorder.0.lock().unwrap().as_slice(),
        &[(0, 2), (1, 2), (2, 2)]
    );
    assert!(!base.join("docs/a.txt").exists());

    let listed = coord.trash().list_trash().unwrap();
    assert_eq!(listed.len(), 2);
    let trashed: Vec<PathBuf> = listed.into_iter().map(|e| e.trashed_path).collect();

    let outcome = coord.start_restore(trashed).unwrap().wait().unwrap();
    assert!(outcome.success, "{outcome:?}");
    assert_eq!(fs::read(base.join("docs/a.txt")).unwrap(), b"a");
    assert_eq!(fs::read(base.join("docs/b.txt")).unwrap(), b"b");
    assert!(coord.trash().list_trash().unwrap().is_empty());

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn trash_batch_surfaces_missing_info_as_warning() {
    let base = uniq_path("coord-trash-warn");
    write_file(&base.join("note.txt"), b"n");
    let coord = coordinator(&base);
    // the sidecar writer's temp name is taken by a directory
    fs::create_dir_all(coord.trash().info_dir().join(format!(
        ".note.txt.trashinfo.tmp-{}",
        std::process::id()
    )))
    .unwrap();

    let outcome = coord
        .start_trash(vec![base.join("note.txt")])
        .unwrap()
        .wait()
        .unwrap();

    assert!(outcome.success, "{outcome:?}");
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.warnings.len(), 1);
    assert!(!base.join("note.txt").exists());
    assert_eq!(coord.trash().list_trash().unwrap().len(), 1);

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn delete_batch_reports_missing_items() {
    let base = uniq_path("coord-delete");
    write_file(&base.join("gone/one"), b"1");
    write_file(&base.join("two"), b"2");
    let coord = coordinator(&base);

    let outcome = coord
        .start_delete(vec![
            base.join("gone"),
            base.join("never-was"),
            base.join("two"),
        ])
        .unwrap()
        .wait()
        .unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].code, "path_not_found");
    assert!(!base.join("gone").exists());
    assert!(!base.join("two").exists());

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn shutdown_cancels_running_job() {
    let base = uniq_path("coord-shutdown");
    write_file(&base.join("src/g"), b"1");
    write_file(&base.join("dst/g"), b"2");
    let coord = coordinator(&base);

    let mut handle = coord
        .start_transfer(TransferRequest::new(
            vec![base.join("src/g")],
            base.join("dst"),
            TransferKind::Copy,
        ))
        .unwrap();
    let _pending = next_conflict(&mut handle);
    assert_eq!(coord.shutdown().unwrap(), 1);

    let outcome = handle.wait().unwrap();
    assert!(outcome.cancelled);
    assert_eq!(coord.shutdown().unwrap(), 0);

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn outcome_serializes_camel_case() {
    let outcome = TransferOutcome {
        success: false,
        errors: vec![crate::errors::ReportedError::new("path_not_found", "gone")],
        warnings: Vec::new(),
        cancelled: false,
        clear_clipboard: false,
    };
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["clearClipboard"], serde_json::json!(false));
    assert_eq!(json["errors"][0]["code"], serde_json::json!("path_not_found"));
}
