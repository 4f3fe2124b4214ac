//! Text generation provider trait shared by every generation backend.

use async_trait::async_trait;
use dyn_clone::DynClone;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::GenerationError;

#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
  pub prompt: String,
  pub system_prompt: Option<String>,
  pub max_tokens: usize,
  pub temperature: f32,
  pub top_p: f32,
}

impl GenerationRequest {
  pub fn new(prompt: impl Into<String>) -> Self {
    Self { prompt: prompt.into(), max_tokens: 1024, temperature: 0.0, top_p: 1.0, ..Default::default() }
  }
}

/// A single piece of a streamed answer, mirroring the append/reset protocol
/// a caller-facing stream uses to render partial then final text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
  Append,
  Reset,
}

#[derive(Debug, Clone)]
pub struct GenerationChunk {
  pub text: String,
  pub state: StreamState,
}

#[async_trait]
pub trait TextGenerator: Send + Sync + DynClone {
  fn name(&self) -> &str;
  fn model_id(&self) -> &str;

  /// Generate a complete answer in one call.
  async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;

  /// Generate an answer as a stream of chunks. The default implementation
  /// calls `generate` and yields the whole answer as a single chunk;
  /// providers capable of true token streaming override this. That one
  /// chunk is necessarily the stream's last, so it carries `Reset`, not
  /// `Append` — callers that only care about the final answer treat
  /// `Reset` as "this snapshot is complete".
  async fn generate_stream(
    &self,
    request: GenerationRequest,
  ) -> Result<BoxStream<'static, Result<GenerationChunk, GenerationError>>, GenerationError> {
    let text = self.generate(request).await?;
    Ok(Box::pin(futures::stream::once(async move {
      Ok(GenerationChunk { text, state: StreamState::Reset })
    })))
  }
}

dyn_clone::clone_trait_object!(TextGenerator);
