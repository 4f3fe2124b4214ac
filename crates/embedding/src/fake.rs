//! Deterministic, non-semantic embedding provider used when no real backend
//! is configured (tests, `EmbeddingProviderKind::Fake`, offline development).

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::{EmbeddingError, EmbeddingProvider};

#[derive(Debug, Clone)]
pub struct FakeEmbeddingProvider {
  dimensions: usize,
}

impl FakeEmbeddingProvider {
  pub fn new(dimensions: usize) -> Self {
    Self { dimensions }
  }

  /// Hash `text` into a unit vector of `self.dimensions` floats. Not
  /// semantically meaningful, but stable and cheap for exercising the
  /// pipeline without a network dependency.
  fn hash_embed(&self, text: &str) -> Vec<f32> {
    let mut vector = Vec::with_capacity(self.dimensions);
    let mut seed = Sha256::digest(text.as_bytes()).to_vec();
    while vector.len() < self.dimensions {
      seed = Sha256::digest(&seed).to_vec();
      for byte in &seed {
        if vector.len() == self.dimensions {
          break;
        }
        vector.push((*byte as f32 / 255.0) * 2.0 - 1.0);
      }
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
      for v in vector.iter_mut() {
        *v /= norm;
      }
    }
    vector
  }
}

impl Default for FakeEmbeddingProvider {
  fn default() -> Self {
    Self::new(768)
  }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbeddingProvider {
  fn name(&self) -> &str {
    "fake"
  }

  fn model_id(&self) -> &str {
    "fake-hash-embed"
  }

  fn dimensions(&self) -> usize {
    self.dimensions
  }

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    Ok(self.hash_embed(text))
  }

  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    Ok(texts.iter().map(|t| self.hash_embed(t)).collect())
  }
}
