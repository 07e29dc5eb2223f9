//! Tests for the script queue and its workers

use super::*;
use super::runner::run_submission;
use crate::engine::Engine;
use crate::host::{MemoryHost, Threading};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_test::{assert_pending, assert_ready};
use tokio_util::sync::CancellationToken;

fn new_queue(host: MemoryHost, config: QueueConfig) -> Arc<ScriptQueue> {
    Arc::new(ScriptQueue::new(
        EngineConfig::default(),
        config,
        Arc::new(host),
    ))
}

fn spawn_worker(queue: &Arc<ScriptQueue>, cancel: &CancellationToken) -> JoinHandle<Result<()>> {
    tokio::spawn(run_worker(queue.clone(), 0, cancel.clone()))
}

async fn wait_for_status(queue: &ScriptQueue, id: SubmissionId, status: SubmissionStatus) {
    for _ in 0..500 {
        if queue.info(id).map(|i| i.status) == Some(status) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("submission never reached {:?}", status);
}

#[tokio::test]
async fn test_submission_runs_to_completion() {
    let queue = new_queue(MemoryHost::new(Threading::Cooperative), QueueConfig::default());
    let cancel = CancellationToken::new();
    let worker = spawn_worker(&queue, &cancel);

    let (id, rx) = queue.submit("hello", "print 'hi'\nprint 1 + 1").unwrap();
    let result = rx.await.unwrap();

    assert_eq!(result.id, id);
    assert!(result.outcome.is_completed());
    assert_eq!(result.output, vec!["hi", "2"]);
    assert!(result.finished_at >= result.submitted_at);
    assert!(queue.is_empty());

    cancel.cancel();
    worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_submissions_run_in_order() {
    let queue = new_queue(MemoryHost::new(Threading::Cooperative), QueueConfig::default());
    let (_, first) = queue.submit("a", "print 'a'").unwrap();
    let (_, second) = queue.submit("b", "print 'b'").unwrap();
    assert_eq!(queue.len(), 2);

    let cancel = CancellationToken::new();
    let worker = spawn_worker(&queue, &cancel);
    let first = first.await.unwrap();
    let second = second.await.unwrap();

    assert_eq!(first.output, vec!["a"]);
    assert_eq!(second.output, vec!["b"]);
    assert!(first.finished_at <= second.finished_at);

    cancel.cancel();
    worker.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_delay_is_completed_by_timer() {
    let queue = new_queue(MemoryHost::new(Threading::Cooperative), QueueConfig::default());
    let cancel = CancellationToken::new();
    let worker = spawn_worker(&queue, &cancel);

    let (id, rx) = queue
        .submit("sleepy", "print 1\ndelay 0.05\nprint 2")
        .unwrap();
    wait_for_status(&queue, id, SubmissionStatus::Suspended).await;
    let result = rx.await.unwrap();

    assert!(result.outcome.is_completed());
    assert_eq!(result.output, vec!["1", "2"]);
    assert!(queue.info(id).is_none());

    cancel.cancel();
    worker.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_worker_finishes_suspended_run_before_next() {
    let queue = new_queue(MemoryHost::new(Threading::Cooperative), QueueConfig::default());
    let cancel = CancellationToken::new();
    let worker = spawn_worker(&queue, &cancel);

    let (first_id, first) = queue.submit("first", "delay 0.05\nprint 'first'").unwrap();
    let (second_id, second) = queue.submit("second", "print 'second'").unwrap();
    wait_for_status(&queue, first_id, SubmissionStatus::Suspended).await;
    assert_eq!(
        queue.info(second_id).map(|i| i.status),
        Some(SubmissionStatus::Waiting)
    );

    let first = first.await.unwrap();
    let second = second.await.unwrap();
    assert_eq!(first.output, vec!["first"]);
    assert_eq!(second.output, vec!["second"]);
    assert!(first.finished_at <= second.finished_at);

    cancel.cancel();
    worker.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_script_load_reads_file() {
    let path = std::env::temp_dir().join(format!("stanza-{}.stz", uuid::Uuid::new_v4()));
    tokio::fs::write(&path, "loaded = 41 + 1").await.unwrap();

    let queue = new_queue(MemoryHost::new(Threading::Cooperative), QueueConfig::default());
    let cancel = CancellationToken::new();
    let worker = spawn_worker(&queue, &cancel);

    let source = format!("script '{}'\nprint loaded", path.display());
    let (_, rx) = queue.submit("loader", source).unwrap();
    let result = rx.await.unwrap();

    assert!(result.outcome.is_completed());
    assert_eq!(result.output, vec!["42"]);

    cancel.cancel();
    worker.await.unwrap().unwrap();
    tokio::fs::remove_file(path).await.unwrap();
}

#[tokio::test]
async fn test_missing_file_fails_the_run() {
    let queue = new_queue(MemoryHost::new(Threading::Cooperative), QueueConfig::default());
    let cancel = CancellationToken::new();
    let worker = spawn_worker(&queue, &cancel);

    let (_, rx) = queue
        .submit("loader", "script '/nonexistent/stanza/lib.stz'")
        .unwrap();
    let result = rx.await.unwrap();

    let err = result.outcome.error().expect("Expected error");
    assert_eq!(err.code, "RUNTIME_ERROR");
    assert!(err.message.contains("cannot load"));

    cancel.cancel();
    worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_compile_error_is_reported() {
    let queue = new_queue(MemoryHost::new(Threading::Cooperative), QueueConfig::default());
    let cancel = CancellationToken::new();
    let worker = spawn_worker(&queue, &cancel);

    let (_, rx) = queue.submit("broken", "while (").unwrap();
    let result = rx.await.unwrap();

    assert_eq!(
        result.outcome.error().map(|e| e.code.as_str()),
        Some("COMPILE_ERROR")
    );
    assert!(result.output.is_empty());

    cancel.cancel();
    worker.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_threaded_host_runs_on_blocking_pool() {
    let host = Arc::new(MemoryHost::new(Threading::Threaded));
    let queue = Arc::new(ScriptQueue::new(
        EngineConfig::default(),
        QueueConfig::default(),
        host.clone(),
    ));
    let cancel = CancellationToken::new();
    let worker = spawn_worker(&queue, &cancel);

    let (_, rx) = queue.submit("threaded", "delay 0.25\nprint 'done'").unwrap();
    let result = rx.await.unwrap();

    assert!(result.outcome.is_completed());
    assert_eq!(host.slept(), vec![Duration::from_millis(250)]);

    cancel.cancel();
    worker.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_interrupts_suspended_run() {
    let queue = new_queue(MemoryHost::new(Threading::Cooperative), QueueConfig::default());
    let cancel = CancellationToken::new();
    let worker = spawn_worker(&queue, &cancel);

    let (id, rx) = queue.submit("forever", "delay 60\nprint 'late'").unwrap();
    wait_for_status(&queue, id, SubmissionStatus::Suspended).await;
    cancel.cancel();

    let result = rx.await.unwrap();
    assert_eq!(
        result.outcome.error().map(|e| e.code.as_str()),
        Some("INTERRUPTED")
    );
    assert!(result.output.is_empty());
    worker.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_between_claim_and_run_interrupts() {
    let queue = new_queue(MemoryHost::new(Threading::Threaded), QueueConfig::default());
    let (_, rx) = queue.submit("spin", "while (true) {\n}").unwrap();
    let claimed = queue.claim(0).await;

    // token fires and the halter halts before the run starts
    let engine = Engine::new(queue.engine_config().clone(), queue.host());
    let cancel = CancellationToken::new();
    cancel.cancel();
    engine.halt();

    let engine = run_submission(&queue, engine, claimed, &cancel).await.unwrap();
    let result = rx.await.unwrap();

    assert_eq!(
        result.outcome.error().map(|e| e.code.as_str()),
        Some("INTERRUPTED")
    );
    assert_eq!(engine.depth(), 0);
}

/* ===================== Queue bookkeeping ===================== */

#[test]
fn test_capacity_limits_waiting_submissions() {
    let config = QueueConfig {
        capacity: 2,
        ..Default::default()
    };
    let queue = new_queue(MemoryHost::new(Threading::Cooperative), config);

    assert!(queue.submit("a", "print 1").is_ok());
    assert!(queue.submit("b", "print 2").is_ok());
    let err = queue.submit("c", "print 3").unwrap_err();

    assert!(err.to_string().contains("queue is full"));
    assert_eq!(queue.len(), 2);
}

#[test]
fn test_unbounded_by_default() {
    let queue = new_queue(MemoryHost::new(Threading::Cooperative), QueueConfig::default());

    for i in 0..50 {
        queue.submit(&format!("s{}", i), "print 1").unwrap();
    }

    assert_eq!(queue.len(), 50);
    assert!(queue
        .snapshot()
        .iter()
        .all(|s| s.status == SubmissionStatus::Waiting));
}

#[test]
fn test_claim_waits_for_submission() {
    let queue = new_queue(MemoryHost::new(Threading::Cooperative), QueueConfig::default());

    let mut claim = tokio_test::task::spawn(queue.claim(3));
    assert_pending!(claim.poll());

    let (id, _rx) = queue.submit("late", "print 1").unwrap();
    assert!(claim.is_woken());
    let claimed = assert_ready!(claim.poll());

    assert_eq!(claimed.id, id);
    assert_eq!(claimed.name, "late");
    let info = queue.info(id).unwrap();
    assert_eq!(info.status, SubmissionStatus::Running);
    assert_eq!(info.worker, Some(3));
}

#[test]
fn test_resume_without_pending_operation() {
    let queue = new_queue(MemoryHost::new(Threading::Cooperative), QueueConfig::default());
    let key = ResumptionKey::new("nobody", 0, "delay");

    assert!(!queue.resume(SubmissionId(Uuid::new_v4()), &key, Completion::Elapsed));
}

#[test]
fn test_resume_delivers_to_registered_waiter() {
    let queue = new_queue(MemoryHost::new(Threading::Cooperative), QueueConfig::default());
    let (id, _rx) = queue.submit("s", "delay 1").unwrap();
    let key = ResumptionKey::new("s", 0, "delay");
    let waiter = queue.register(id, key.clone());

    assert!(queue.resume(id, &key, Completion::Loaded("x".into())));

    let completion = tokio_test::block_on(waiter).unwrap();
    assert_eq!(completion, Completion::Loaded("x".into()));
    assert!(!queue.resume(id, &key, Completion::Elapsed));
}

#[test]
fn test_info_serializes() {
    let queue = new_queue(MemoryHost::new(Threading::Cooperative), QueueConfig::default());
    let (id, _rx) = queue.submit("s", "print 1").unwrap();

    let json = serde_json::to_value(queue.info(id).unwrap()).unwrap();

    assert_eq!(json["status"], "waiting");
    assert_eq!(json["name"], "s");
}
