//! End-to-end tests of the queue-backed orchestrator: per-step queues
//! drained by `run_worker`, including the crash-recovery rollback path.

use std::sync::Arc;
use std::time::Duration;

use db::{ContentStore, FsContentStore};
use memcore::{FileDescriptor, Tags};
use pipeline::handlers;
use pipeline::{QueueMessage, QueueOrchestratorBuilder};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

async fn wait_until_complete(
  content_store: &FsContentStore,
  index: &str,
  document_id: &str,
  timeout: Duration,
) -> memcore::DataPipeline {
  let deadline = tokio::time::Instant::now() + timeout;
  loop {
    if let Some(pipeline) = content_store.read_pipeline_status(index, document_id).await.unwrap() {
      if pipeline.is_complete() {
        return pipeline;
      }
    }
    if tokio::time::Instant::now() >= deadline {
      panic!("pipeline did not complete within {timeout:?}");
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
}

#[tokio::test]
async fn drains_a_single_step_queue_to_completion() {
  let storage = TempDir::new().unwrap();
  let content_store = Arc::new(FsContentStore::new(storage.path().join("content")));

  let extractor = Arc::new(extract::ExtractorRegistry::default());
  let mut builder = QueueOrchestratorBuilder::new();
  builder.attach(
    Arc::new(handlers::ExtractHandler::new(content_store.clone(), extractor)),
    Duration::from_secs(30),
    5,
  );
  let orchestrator = builder.build(content_store.clone());

  let file = FileDescriptor::new("notes.txt", b"hello world", "text/plain");
  orchestrator
    .import_document("research", "doc-queue-1", Tags::new(), vec!["extract".to_string()], vec![(file, b"hello world".to_vec())])
    .await
    .unwrap();

  let cancel = CancellationToken::new();
  let worker_cancel = cancel.clone();
  let worker = {
    let orchestrator = orchestrator.clone();
    tokio::spawn(async move { orchestrator.run_worker("extract", worker_cancel).await })
  };

  let pipeline = wait_until_complete(&content_store, "research", "doc-queue-1", Duration::from_secs(5)).await;
  assert_eq!(pipeline.completed_steps, vec!["extract".to_string()]);

  cancel.cancel();
  worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn recovers_from_a_stale_redelivered_message_by_rolling_back_one_step() {
  let storage = TempDir::new().unwrap();
  let content_store = Arc::new(FsContentStore::new(storage.path().join("content")));

  let extractor = Arc::new(extract::ExtractorRegistry::default());
  let mut builder = QueueOrchestratorBuilder::new();
  builder.attach(
    Arc::new(handlers::ExtractHandler::new(content_store.clone(), extractor)),
    Duration::from_secs(30),
    5,
  );
  let orchestrator = builder.build(content_store.clone());
  let extract_queue = builder.queue_for("extract").unwrap();

  let file = FileDescriptor::new("notes.txt", b"hello world", "text/plain");
  orchestrator
    .import_document("research", "doc-queue-2", Tags::new(), vec!["extract".to_string()], vec![(file, b"hello world".to_vec())])
    .await
    .unwrap();

  let cancel = CancellationToken::new();
  let worker_cancel = cancel.clone();
  let worker = {
    let orchestrator = orchestrator.clone();
    tokio::spawn(async move { orchestrator.run_worker("extract", worker_cancel).await })
  };

  let completed = wait_until_complete(&content_store, "research", "doc-queue-2", Duration::from_secs(5)).await;
  assert_eq!(completed.completed_steps, vec!["extract".to_string()]);
  cancel.cancel();
  worker.await.unwrap().unwrap();

  // Simulate a redelivered message for "extract" arriving after the step
  // already completed and was persisted (the crash-between-persist-and-ack
  // window). The message still names the step it was leased for.
  extract_queue.enqueue(QueueMessage::new("research", "doc-queue-2")).await;

  let cancel = CancellationToken::new();
  let worker_cancel = cancel.clone();
  let worker = {
    let orchestrator = orchestrator.clone();
    tokio::spawn(async move { orchestrator.run_worker("extract", worker_cancel).await })
  };

  // The orchestrator rolls the pipeline back to "extract", reruns the
  // idempotent handler (it already has an ExtractedText artifact, so the
  // handler does nothing new), and advances back to the same completed state.
  let recovered = wait_until_complete(&content_store, "research", "doc-queue-2", Duration::from_secs(5)).await;
  assert_eq!(recovered.completed_steps, vec!["extract".to_string()]);
  assert_eq!(recovered.files[0].generated_files.len(), 1);

  // Give the worker a moment to finish acking before checking for failures:
  // a process_one error would have nacked the message into the dead letter
  // list instead of succeeding silently.
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert!(extract_queue.dead_letters().await.is_empty());

  cancel.cancel();
  worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn run_worker_rejects_an_unbound_step() {
  let storage = TempDir::new().unwrap();
  let content_store = Arc::new(FsContentStore::new(storage.path().join("content")));
  let builder = QueueOrchestratorBuilder::new();
  let orchestrator = builder.build(content_store.clone());

  let err = orchestrator.run_worker("no-such-step", CancellationToken::new()).await.unwrap_err();
  assert!(matches!(err, pipeline::OrchestratorError::UnknownStep(step) if step == "no-such-step"));
}
