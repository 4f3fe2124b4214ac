//! Retry wrapper: transient provider errors get a bounded number of
//! exponential-backoff retries before giving up.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::{EmbeddingError, EmbeddingProvider};

#[derive(Debug, Clone)]
pub struct RetryConfig {
  pub max_retries: u32,
  pub base_delay: Duration,
  pub max_delay: Duration,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retries: 3,
      base_delay: Duration::from_millis(200),
      max_delay: Duration::from_secs(10),
    }
  }
}

/// Errors worth retrying: transport failures and explicit rate-limit signals.
/// Provider-reported validation errors are not retried.
pub fn is_retryable_error(err: &EmbeddingError) -> bool {
  matches!(err, EmbeddingError::Http(_) | EmbeddingError::RateLimited(_))
}

#[derive(Clone)]
pub struct ResilientProvider<P> {
  inner: P,
  config: RetryConfig,
}

impl<P: EmbeddingProvider> ResilientProvider<P> {
  pub fn new(provider: P) -> Self {
    Self::with_config(provider, RetryConfig::default())
  }

  pub fn with_config(provider: P, config: RetryConfig) -> Self {
    Self { inner: provider, config }
  }

  async fn retrying<T, F, Fut>(&self, op: F) -> Result<T, EmbeddingError>
  where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, EmbeddingError>>,
  {
    let mut attempt = 0;
    loop {
      match op().await {
        Ok(value) => return Ok(value),
        Err(err) if attempt < self.config.max_retries && is_retryable_error(&err) => {
          let delay = (self.config.base_delay * 2u32.pow(attempt)).min(self.config.max_delay);
          warn!(attempt, provider = self.inner.name(), %err, "embedding call failed, retrying after {:?}", delay);
          sleep(delay).await;
          attempt += 1;
        }
        Err(err) => {
          debug!(provider = self.inner.name(), %err, "embedding call failed, giving up");
          return Err(err);
        }
      }
    }
  }
}

#[async_trait]
impl<P: EmbeddingProvider + Send + Sync> EmbeddingProvider for ResilientProvider<P> {
  fn name(&self) -> &str {
    self.inner.name()
  }

  fn model_id(&self) -> &str {
    self.inner.model_id()
  }

  fn dimensions(&self) -> usize {
    self.inner.dimensions()
  }

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    self.retrying(|| self.inner.embed(text)).await
  }

  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    self.retrying(|| self.inner.embed_batch(texts)).await
  }

  async fn is_available(&self) -> bool {
    self.inner.is_available().await
  }
}

pub fn wrap_resilient<P: EmbeddingProvider>(provider: P, config: RetryConfig) -> ResilientProvider<P> {
  ResilientProvider::with_config(provider, config)
}

pub fn wrap_resilient_arc(
  provider: Arc<dyn EmbeddingProvider>,
  config: RetryConfig,
) -> ResilientProvider<Arc<dyn EmbeddingProvider>> {
  ResilientProvider::with_config(provider, config)
}

#[async_trait]
impl EmbeddingProvider for Arc<dyn EmbeddingProvider> {
  fn name(&self) -> &str {
    (**self).name()
  }

  fn model_id(&self) -> &str {
    (**self).model_id()
  }

  fn dimensions(&self) -> usize {
    (**self).dimensions()
  }

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    (**self).embed(text).await
  }

  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    (**self).embed_batch(texts).await
  }

  async fn is_available(&self) -> bool {
    (**self).is_available().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  #[derive(Clone)]
  struct FlakyProvider {
    failures_left: Arc<AtomicUsize>,
  }

  #[async_trait]
  impl EmbeddingProvider for FlakyProvider {
    fn name(&self) -> &str {
      "flaky"
    }

    fn model_id(&self) -> &str {
      "flaky-model"
    }

    fn dimensions(&self) -> usize {
      4
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
      if self.failures_left.fetch_sub(1, Ordering::SeqCst) > 0 {
        return Err(EmbeddingError::RateLimited(Duration::from_millis(1)));
      }
      Ok(vec![0.0; 4])
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
      Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
    }
  }

  #[tokio::test]
  async fn retries_until_success_within_budget() {
    let provider = FlakyProvider {
      failures_left: Arc::new(AtomicUsize::new(2)),
    };
    let resilient = ResilientProvider::with_config(
      provider,
      RetryConfig {
        max_retries: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
      },
    );
    assert!(resilient.embed("hi").await.is_ok());
  }

  #[tokio::test]
  async fn gives_up_after_max_retries() {
    let provider = FlakyProvider {
      failures_left: Arc::new(AtomicUsize::new(10)),
    };
    let resilient = ResilientProvider::with_config(
      provider,
      RetryConfig {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
      },
    );
    assert!(resilient.embed("hi").await.is_err());
  }
}
