//! End-to-end test of `SearchClient` against a real `LanceVectorStore`
//! seeded through the pipeline handlers, with fake generation providers.

use std::collections::HashSet;
use std::sync::Arc;

use db::{FsContentStore, LanceVectorStore, VectorStore};
use embedding::FakeEmbeddingProvider;
use extract::ExtractorRegistry;
use llm::{FakeTextGenerator, KeywordModerator};
use memcore::{FileDescriptor, Tags};
use pipeline::handlers::{self, DEFAULT_STEPS};
use pipeline::{HandlerRegistry, InProcessOrchestrator};
use search::{AskOptions, SearchClient};
use tempfile::TempDir;

async fn seeded_client(storage: &TempDir) -> (Arc<LanceVectorStore>, SearchClient) {
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
  orchestrator
    .import_document("research", "doc-1", Tags::new(), steps, vec![(file, b"The quick brown fox jumps over the lazy dog.".to_vec())])
    .await
    .unwrap();

  let client = SearchClient::new(
    vector_store.clone(),
    Arc::new(FakeEmbeddingProvider::default()),
    Arc::new(FakeTextGenerator),
    Arc::new(KeywordModerator::default()),
    true,
  );

  (vector_store, client)
}

#[tokio::test]
async fn search_finds_the_seeded_partition() {
  let storage = TempDir::new().unwrap();
  let (_vector_store, client) = seeded_client(&storage).await;

  let result = client.search("research", "fox", &[], 0.0, 10).await.unwrap();
  assert!(!result.no_result);
  assert!(!result.results.is_empty());
  assert_eq!(result.results[0].document_id, "doc-1");
}

#[tokio::test]
async fn ask_returns_a_grounded_answer_with_citations() {
  let storage = TempDir::new().unwrap();
  let (_vector_store, client) = seeded_client(&storage).await;

  let answer = client.ask("research", "what does the fox do", &[], &AskOptions::default()).await.unwrap();
  assert_eq!(answer.result_kind, search::ResultKind::Success);
  assert!(!answer.citations.is_empty());
  assert!(!answer.text.is_empty());
}

/// The "red" counterpart to `ask_returns_a_grounded_answer_with_citations`:
/// a document is indexed, but the relevance floor is set above what any
/// match can clear, so the ask is grounded in nothing and reports it rather
/// than answering off of a weak match.
#[tokio::test]
async fn ask_reports_no_facts_when_nothing_clears_the_relevance_floor() {
  let storage = TempDir::new().unwrap();
  let (_vector_store, client) = seeded_client(&storage).await;

  let options = AskOptions { min_relevance: 1.01, ..AskOptions::default() };
  let answer = client.ask("research", "what does the fox do", &[], &options).await.unwrap();
  assert_eq!(answer.result_kind, search::ResultKind::NoFacts);
  assert!(answer.citations.is_empty());
}

/// Tag filters with a repeated key are a union: passing `user=alice` and
/// `user=bob` matches either value, not their intersection.
#[tokio::test]
async fn search_filters_match_either_value_for_a_repeated_tag_key() {
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

  let alice_tags = Tags::from_pairs([("user".to_string(), "alice".to_string())]).unwrap();
  let alice_file = FileDescriptor::new("alice.txt", b"Alpha document owned by alice.", "text/plain");
  orchestrator
    .import_document("research", "doc-alice", alice_tags, steps.clone(), vec![(alice_file, b"Alpha document owned by alice.".to_vec())])
    .await
    .unwrap();

  let bob_tags = Tags::from_pairs([("user".to_string(), "bob".to_string())]).unwrap();
  let bob_file = FileDescriptor::new("bob.txt", b"Beta document owned by bob.", "text/plain");
  orchestrator
    .import_document("research", "doc-bob", bob_tags, steps, vec![(bob_file, b"Beta document owned by bob.".to_vec())])
    .await
    .unwrap();

  let client = SearchClient::new(
    vector_store,
    Arc::new(FakeEmbeddingProvider::default()),
    Arc::new(FakeTextGenerator),
    Arc::new(KeywordModerator::default()),
    true,
  );

  let union = client
    .search("research", "", &[("user".to_string(), "alice".to_string()), ("user".to_string(), "bob".to_string())], 0.0, 50)
    .await
    .unwrap();
  assert!(!union.no_result);
  let document_ids: HashSet<_> = union.results.iter().map(|c| c.document_id.clone()).collect();
  assert_eq!(document_ids, HashSet::from(["doc-alice".to_string(), "doc-bob".to_string()]));

  let carol_only = client.search("research", "", &[("user".to_string(), "carol".to_string())], 0.0, 50).await.unwrap();
  assert!(carol_only.no_result);
}

#[tokio::test]
async fn ask_reports_no_facts_for_an_empty_index() {
  let storage = TempDir::new().unwrap();
  let vector_store = Arc::new(LanceVectorStore::open(storage.path().join("vectors"), 768).await.unwrap());
  vector_store.ensure_index("empty").await.unwrap();

  let client = SearchClient::new(
    vector_store,
    Arc::new(FakeEmbeddingProvider::default()),
    Arc::new(FakeTextGenerator),
    Arc::new(KeywordModerator::default()),
    true,
  );

  let answer = client.ask("empty", "anything", &[], &AskOptions::default()).await.unwrap();
  assert_eq!(answer.result_kind, search::ResultKind::NoFacts);
}

#[tokio::test]
async fn list_indexes_reports_the_seeded_index() {
  let storage = TempDir::new().unwrap();
  let (_vector_store, client) = seeded_client(&storage).await;

  let indexes = client.list_indexes().await.unwrap();
  assert!(indexes.iter().any(|i| i.name == "research"));
}
