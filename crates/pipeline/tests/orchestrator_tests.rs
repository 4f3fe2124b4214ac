//! End-to-end test of the in-process orchestrator driving a document
//! through every content-processing step with fake providers.

use std::sync::Arc;

use db::{ContentStore, FsContentStore, LanceVectorStore};
use embedding::{EmbeddingProvider, FakeEmbeddingProvider};
use extract::ExtractorRegistry;
use llm::FakeTextGenerator;
use memcore::{FileDescriptor, Tags};
use pipeline::handlers::{self, DEFAULT_STEPS};
use pipeline::{HandlerRegistry, InProcessOrchestrator};
use tempfile::TempDir;

#[tokio::test]
async fn imports_a_document_through_every_step() {
  let storage = TempDir::new().unwrap();
  let content_store = Arc::new(FsContentStore::new(storage.path().join("content")));
  let vector_store = Arc::new(LanceVectorStore::open(storage.path().join("vectors"), 768).await.unwrap());

  let mut registry = HandlerRegistry::new();
  registry
    .register(Arc::new(handlers::ExtractHandler::new(content_store.clone(), Arc::new(ExtractorRegistry::default()))))
    .register(Arc::new(handlers::PartitionHandler::new(content_store.clone(), Default::default())))
    .register(Arc::new(handlers::SummarizeHandler::new(content_store.clone(), Arc::new(FakeTextGenerator), 64)))
    .register(Arc::new(handlers::EmbedHandler::new(content_store.clone(), Arc::new(FakeEmbeddingProvider::default()))))
    .register(Arc::new(handlers::SaveRecordsHandler::new(content_store.clone(), vector_store.clone())));

  let orchestrator = InProcessOrchestrator::new(content_store.clone(), registry);

  let file = FileDescriptor::new("notes.txt", b"The quick brown fox jumps over the lazy dog.", "text/plain");
  let steps = DEFAULT_STEPS.iter().map(|s| s.to_string()).collect();

  let pipeline = orchestrator
    .import_document("research", "doc-1", Tags::new(), steps, vec![(file, b"The quick brown fox jumps over the lazy dog.".to_vec())])
    .await
    .unwrap();

  assert!(pipeline.is_complete());
  assert_eq!(pipeline.completed_steps, DEFAULT_STEPS);

  let found = orchestrator.read_pipeline_status("research", "doc-1").await.unwrap().unwrap();
  assert!(orchestrator.is_document_ready("research", "doc-1").await.unwrap());
  assert_eq!(found.document_id, "doc-1");

  let query_vector = FakeEmbeddingProvider::default().embed("fox").await.unwrap();
  let hits = vector_store.search("research", &query_vector, 10, &[], 0.0).await.unwrap();
  assert!(!hits.is_empty());
}

#[tokio::test]
async fn deletes_a_document_and_its_records() {
  let storage = TempDir::new().unwrap();
  let content_store = Arc::new(FsContentStore::new(storage.path().join("content")));
  let vector_store = Arc::new(LanceVectorStore::open(storage.path().join("vectors"), 768).await.unwrap());

  let mut registry = HandlerRegistry::new();
  registry
    .register(Arc::new(handlers::ExtractHandler::new(content_store.clone(), Arc::new(ExtractorRegistry::default()))))
    .register(Arc::new(handlers::PartitionHandler::new(content_store.clone(), Default::default())))
    .register(Arc::new(handlers::SummarizeHandler::new(content_store.clone(), Arc::new(FakeTextGenerator), 64)))
    .register(Arc::new(handlers::EmbedHandler::new(content_store.clone(), Arc::new(FakeEmbeddingProvider::default()))))
    .register(Arc::new(handlers::SaveRecordsHandler::new(content_store.clone(), vector_store.clone())))
    .register(Arc::new(handlers::DeleteDocumentHandler::new(content_store.clone(), vector_store.clone())));

  let orchestrator = InProcessOrchestrator::new(content_store.clone(), registry);

  let file = FileDescriptor::new("notes.txt", b"hello world", "text/plain");
  let steps = DEFAULT_STEPS.iter().map(|s| s.to_string()).collect();
  orchestrator
    .import_document("research", "doc-2", Tags::new(), steps, vec![(file, b"hello world".to_vec())])
    .await
    .unwrap();

  orchestrator.start_document_deletion("research", "doc-2").await.unwrap();

  assert!(content_store.read_pipeline_status("research", "doc-2").await.unwrap().is_none());
}

/// A second import under the same `(index, documentId)` captures the first
/// execution as a previous one to purge, and `SaveRecordsHandler` reclaims
/// its records instead of leaving both versions' partitions indexed side by
/// side.
#[tokio::test]
async fn reimporting_a_document_consolidates_records_from_the_previous_execution() {
  let storage = TempDir::new().unwrap();
  let content_store = Arc::new(FsContentStore::new(storage.path().join("content")));
  let vector_store = Arc::new(LanceVectorStore::open(storage.path().join("vectors"), 768).await.unwrap());

  let mut registry = HandlerRegistry::new();
  registry
    .register(Arc::new(handlers::ExtractHandler::new(content_store.clone(), Arc::new(ExtractorRegistry::default()))))
    .register(Arc::new(handlers::PartitionHandler::new(content_store.clone(), Default::default())))
    .register(Arc::new(handlers::SummarizeHandler::new(content_store.clone(), Arc::new(FakeTextGenerator), 64)))
    .register(Arc::new(handlers::EmbedHandler::new(content_store.clone(), Arc::new(FakeEmbeddingProvider::default()))))
    .register(Arc::new(handlers::SaveRecordsHandler::new(content_store.clone(), vector_store.clone())));

  let orchestrator = InProcessOrchestrator::new(content_store.clone(), registry);
  let steps: Vec<String> = DEFAULT_STEPS.iter().map(|s| s.to_string()).collect();

  let first = FileDescriptor::new("notes.txt", b"Alpha version content here.", "text/plain");
  orchestrator
    .import_document("research", "doc-3", Tags::new(), steps.clone(), vec![(first, b"Alpha version content here.".to_vec())])
    .await
    .unwrap();

  let zero_vector = vec![0.0f32; 768];
  let after_first = vector_store.search("research", &zero_vector, 50, &[], 0.0).await.unwrap();
  assert!(!after_first.is_empty());
  assert!(after_first.iter().all(|hit| hit.record.payload.get("text").and_then(|v| v.as_str()).unwrap_or_default().contains("Alpha")));

  let second = FileDescriptor::new("notes.txt", b"Beta version content instead.", "text/plain");
  let pipeline = orchestrator
    .import_document("research", "doc-3", Tags::new(), steps, vec![(second, b"Beta version content instead.".to_vec())])
    .await
    .unwrap();
  assert!(pipeline.is_complete());

  let after_second = vector_store.search("research", &zero_vector, 50, &[], 0.0).await.unwrap();
  assert!(!after_second.is_empty());
  assert!(
    after_second.iter().all(|hit| hit.record.payload.get("text").and_then(|v| v.as_str()).unwrap_or_default().contains("Beta")),
    "no record from the first execution's content should remain after consolidation"
  );
}
