//! Workspace-level acceptance tests: the numbered scenarios from the
//! spec's "Testable Properties" section, exercised against the real
//! crates rather than mocks — storage for the durable invariants,
//! the daemon's actual IPC listener for the log-tail follow contract.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use spindle_core::{Fingerprint, ItemId, ItemStatus, SystemClock};
use spindle_daemon::{lifecycle, Config, ListenCtx, Listener};
use spindle_storage::QueueStore;
use spindle_wire::{read_message, write_message, Request, Response};
use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;

fn test_config(dir: &Path) -> Config {
    Config {
        socket_path: dir.join("spindle.sock"),
        lock_path: dir.join("spindle.lock"),
        pid_path: dir.join("spindle.pid"),
        log_path: dir.join("spindle.log"),
        queue_db_path: dir.join("queue.db"),
        staging_dir: dir.join("staging"),
        cache_dir: dir.join("cache"),
        settings_path: dir.join("spindle.toml"),
        state_dir: dir.to_path_buf(),
    }
}

/// Invariant 1: at most one non-terminal item per fingerprint survives
/// unless `allow_duplicate` overrides the check.
#[test]
fn fingerprint_uniqueness_rejects_a_second_active_insert() {
    let dir = tempfile::tempdir().unwrap();
    let store = QueueStore::open(dir.path(), SystemClock).unwrap();
    let fp = Fingerprint::new("FP1");

    store.new_disc("The Matrix", None, fp.clone(), false, 0).unwrap();
    let err = store.new_disc("The Matrix", None, fp.clone(), false, 0).unwrap_err();
    assert!(matches!(err, spindle_storage::StorageError::DuplicateFingerprint(_)));

    // allow_duplicate bypasses the check.
    store.new_disc("The Matrix", None, fp, true, 0).unwrap();
    assert_eq!(store.list().len(), 2);
}

/// S3: crash recovery maps each mid-processing status to its resume
/// point, and invariant 2 requires `reset_stuck` to be idempotent.
#[test]
fn s3_crash_recovery_resets_stuck_items_to_their_resume_point() {
    let dir = tempfile::tempdir().unwrap();
    let store = QueueStore::open(dir.path(), SystemClock).unwrap();

    let identifying = store.new_disc("A", None, Fingerprint::new("FP-A"), false, 0).unwrap();
    store.update_status(identifying.id, ItemStatus::Identifying, None).unwrap();

    let ripping = store.new_disc("B", None, Fingerprint::new("FP-B"), false, 0).unwrap();
    store.update_status(ripping.id, ItemStatus::Ripping, None).unwrap();

    let encoding = store.new_disc("C", None, Fingerprint::new("FP-C"), false, 0).unwrap();
    store.update_status(encoding.id, ItemStatus::Encoding, None).unwrap();

    let organizing = store.new_disc("D", None, Fingerprint::new("FP-D"), false, 0).unwrap();
    store.update_status(organizing.id, ItemStatus::Organizing, None).unwrap();

    let reset = store.reset_stuck().unwrap();
    assert_eq!(reset.len(), 4);

    assert_eq!(store.get_by_id(identifying.id).unwrap().status, ItemStatus::Pending);
    assert_eq!(store.get_by_id(ripping.id).unwrap().status, ItemStatus::Identified);
    assert_eq!(store.get_by_id(encoding.id).unwrap().status, ItemStatus::Ripped);
    assert_eq!(store.get_by_id(organizing.id).unwrap().status, ItemStatus::Encoded);

    // Applying it again is a no-op: nothing is left in a processing status.
    let second = store.reset_stuck().unwrap();
    assert!(second.is_empty());
}

/// S5: stopping an in-flight item marks it failed with a `user_stop`
/// review reason while leaving untouched items alone.
#[test]
fn s5_stop_in_flight_leaves_pending_items_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = QueueStore::open(dir.path(), SystemClock).unwrap();

    let ripping = store.new_disc("Ripping Disc", None, Fingerprint::new("FP-R"), false, 0).unwrap();
    store.update_status(ripping.id, ItemStatus::Ripping, None).unwrap();
    let pending = store.new_disc("Pending Disc", None, Fingerprint::new("FP-P"), false, 0).unwrap();

    store.stop_items(&[ripping.id]).unwrap();

    let stopped = store.get_by_id(ripping.id).unwrap();
    assert_eq!(stopped.status, ItemStatus::Failed);
    assert_eq!(stopped.review_reason.as_deref(), Some("user_stop"));

    let untouched = store.get_by_id(pending.id).unwrap();
    assert_eq!(untouched.status, ItemStatus::Pending);
}

/// S7: `log_tail(offset=-1, limit=2)` reads the last two lines, and a
/// subsequent `follow` call unblocks as soon as a new line is appended.
#[tokio::test]
async fn s7_log_tail_follow_unblocks_on_new_data() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    std::fs::write(&config.log_path, "a\nb\nc\n").unwrap();

    let daemon = Arc::new(lifecycle::startup(config).await.unwrap());
    let shutdown = CancellationToken::new();
    let ctx = Arc::new(ListenCtx { daemon: daemon.clone(), shutdown: shutdown.clone(), dependencies: vec![] });
    let listener = Listener::bind(&daemon.config.socket_path, ctx).unwrap();
    let listener_task = tokio::spawn(listener.run());

    let tail_offset = {
        let mut stream = UnixStream::connect(&daemon.config.socket_path).await.unwrap();
        write_message(&mut stream, &Request::LogTail { offset: -1, limit: 2, follow: false, wait_millis: 0 })
            .await
            .unwrap();
        match read_message::<_, Response>(&mut stream).await.unwrap() {
            Response::LogLines { lines, offset } => {
                assert_eq!(lines, vec!["b".to_string(), "c".to_string()]);
                offset
            }
            other => panic!("unexpected response: {other:?}"),
        }
    };

    let log_path = daemon.config.log_path.clone();
    let follow_task = tokio::spawn(async move {
        let mut stream = UnixStream::connect(&daemon.config.socket_path).await.unwrap();
        write_message(
            &mut stream,
            &Request::LogTail { offset: tail_offset, limit: 10, follow: true, wait_millis: 5_000 },
        )
        .await
        .unwrap();
        read_message::<_, Response>(&mut stream).await.unwrap()
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut file = std::fs::OpenOptions::new().append(true).open(&log_path).unwrap();
    use std::io::Write as _;
    writeln!(file, "d").unwrap();

    let response = tokio::time::timeout(Duration::from_secs(5), follow_task).await.unwrap().unwrap();
    match response {
        Response::LogLines { lines, .. } => assert_eq!(lines, vec!["d".to_string()]),
        other => panic!("unexpected response: {other:?}"),
    }

    shutdown.cancel();
    let _ = listener_task.await;
    daemon.shutdown().await;
}

/// Exercises the daemon's `Hello`/`Status` round-trip over the real
/// socket, independent of the log-tail path above.
#[tokio::test]
async fn hello_and_status_round_trip_over_the_socket() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let daemon = Arc::new(lifecycle::startup(config).await.unwrap());
    let shutdown = CancellationToken::new();
    let ctx = Arc::new(ListenCtx { daemon: daemon.clone(), shutdown: shutdown.clone(), dependencies: vec!["ffmpeg".into()] });
    let listener = Listener::bind(&daemon.config.socket_path, ctx).unwrap();
    let listener_task = tokio::spawn(listener.run());

    let mut stream = UnixStream::connect(&daemon.config.socket_path).await.unwrap();
    write_message(&mut stream, &Request::Hello { version: "test".into() }).await.unwrap();
    match read_message::<_, Response>(&mut stream).await.unwrap() {
        Response::Hello { version } => assert!(!version.is_empty()),
        other => panic!("unexpected response: {other:?}"),
    }

    let mut stream = UnixStream::connect(&daemon.config.socket_path).await.unwrap();
    write_message(&mut stream, &Request::Status).await.unwrap();
    match read_message::<_, Response>(&mut stream).await.unwrap() {
        Response::Status { running, queue_stats, .. } => {
            assert!(running);
            assert_eq!(queue_stats.get("total").copied().unwrap_or(999), 0);
        }
        other => panic!("unexpected response: {other:?}"),
    }

    shutdown.cancel();
    let _ = listener_task.await;
    daemon.shutdown().await;
    let _ = ItemId::new(0);
}
