//! Embedding provider trait implemented by every embedding backend.

use async_trait::async_trait;
use dyn_clone::DynClone;

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
  #[error("embedding request failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("provider error: {0}")]
  ProviderError(String),
  #[error("rate limit exceeded, gave up after waiting {0:?}")]
  RateLimited(std::time::Duration),
  #[error("embedding provider not configured: {0}")]
  NotConfigured(String),
}

/// Distinguishes the two embedding modes some providers treat differently
/// (asymmetric models prepend a different instruction per mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingMode {
  Document,
  Query,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync + DynClone {
  /// The name of this provider (for logging/identification).
  fn name(&self) -> &str;

  /// The model identifier in use.
  fn model_id(&self) -> &str;

  /// The dimensionality of vectors this provider returns.
  fn dimensions(&self) -> usize;

  /// Embed a single piece of text.
  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

  /// Embed a batch of texts, one vector per input in the same order.
  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

  /// Whether the provider is currently reachable/configured. Defaults to
  /// `true`; backends that can cheaply check (a local daemon, an API key)
  /// override this.
  async fn is_available(&self) -> bool {
    true
  }
}

dyn_clone::clone_trait_object!(EmbeddingProvider);
