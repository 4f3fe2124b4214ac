//! Builds the orchestrator and search client object graph from `Config`.
//! Shared by the HTTP server and the CLI so both wire up identically.

use std::sync::Arc;

use db::{ContentStore, FsContentStore, LanceVectorStore, VectorStore};
use embedding::{EmbeddingProvider, FakeEmbeddingProvider, OllamaProvider, OpenRouterProvider};
use extract::ExtractorRegistry;
use llm::{ContentModerator, FakeTextGenerator, KeywordModerator, OpenRouterGenerator, TextGenerator};
use memcore::config::{Config, EmbeddingProviderKind, GenerationProviderKind};
use pipeline::{HandlerRegistry, InProcessOrchestrator, handlers};
use search::SearchClient;

use crate::error::DaemonError;

fn build_embedding_provider(config: &Config) -> Arc<dyn EmbeddingProvider> {
  match config.embedding.provider {
    EmbeddingProviderKind::Fake => Arc::new(FakeEmbeddingProvider::new(config.embedding.dimensions)),
    EmbeddingProviderKind::Ollama => {
      let mut provider = OllamaProvider::new().with_model(&config.embedding.model, config.embedding.dimensions);
      if let Some(url) = &config.embedding.url {
        provider = provider.with_url(url.clone());
      }
      Arc::new(provider)
    }
    EmbeddingProviderKind::OpenRouter => {
      let api_key = resolve_api_key(&config.embedding.api_key_env);
      Arc::new(OpenRouterProvider::new(api_key).with_model(&config.embedding.model, config.embedding.dimensions))
    }
  }
}

fn build_text_generator(config: &Config) -> Arc<dyn TextGenerator> {
  match config.generation.provider {
    GenerationProviderKind::Fake => Arc::new(FakeTextGenerator),
    GenerationProviderKind::OpenRouter => {
      let api_key = resolve_api_key(&None);
      Arc::new(OpenRouterGenerator::new(api_key, config.generation.model.clone()))
    }
  }
}

fn resolve_api_key(env_var: &Option<String>) -> String {
  env_var
    .as_deref()
    .or(Some("OPENROUTER_API_KEY"))
    .and_then(|name| std::env::var(name).ok())
    .unwrap_or_default()
}

/// Build the in-process orchestrator (with every content-processing and
/// deletion handler registered) and the search client sharing one
/// `ContentStore`/`VectorStore` pair.
pub async fn build(config: &Config) -> Result<(Arc<InProcessOrchestrator>, Arc<SearchClient>), DaemonError> {
  let content_store: Arc<dyn ContentStore> = Arc::new(FsContentStore::new(config.content_store.root.clone()));
  let vector_store: Arc<dyn VectorStore> =
    Arc::new(LanceVectorStore::open(&config.vector_store.path, config.vector_store.dimensions).await?);

  let embedder = build_embedding_provider(config);
  let generator = build_text_generator(config);
  let moderator: Arc<dyn ContentModerator> = Arc::new(KeywordModerator::default());

  let mut registry = HandlerRegistry::new();
  registry
    .register(Arc::new(handlers::ExtractHandler::new(content_store.clone(), Arc::new(ExtractorRegistry::default()))))
    .register(Arc::new(handlers::PartitionHandler::new(
      content_store.clone(),
      extract::PartitionOptions {
        max_tokens_per_line: config.pipeline.max_tokens_per_line,
        max_tokens_per_paragraph: config.pipeline.max_tokens_per_paragraph,
        overlapping_tokens: config.pipeline.overlapping_tokens,
        markdown_aware: true,
      },
    )))
    .register(Arc::new(handlers::SummarizeHandler::new(
      content_store.clone(),
      generator.clone(),
      config.pipeline.summary_max_tokens,
    )))
    .register(Arc::new(handlers::EmbedHandler::new(content_store.clone(), embedder.clone())))
    .register(Arc::new(handlers::SaveRecordsHandler::new(content_store.clone(), vector_store.clone())))
    .register(Arc::new(handlers::DeleteDocumentHandler::new(content_store.clone(), vector_store.clone())))
    .register(Arc::new(handlers::DeleteIndexHandler::new(content_store.clone(), vector_store.clone())));

  let orchestrator = Arc::new(InProcessOrchestrator::new(content_store, registry));
  let search_client =
    Arc::new(SearchClient::new(vector_store, embedder, generator, moderator, config.generation.moderate_answers));

  Ok((orchestrator, search_client))
}
