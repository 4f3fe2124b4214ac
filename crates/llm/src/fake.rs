//! Deterministic text generator used when no real backend is configured.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{GenerationChunk, GenerationError, GenerationRequest, StreamState, TextGenerator};

#[derive(Debug, Clone, Default)]
pub struct FakeTextGenerator;

#[async_trait]
impl TextGenerator for FakeTextGenerator {
  fn name(&self) -> &str {
    "fake"
  }

  fn model_id(&self) -> &str {
    "fake-echo"
  }

  async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
    Ok(format!("[fake answer based on {} chars of context]", request.prompt.len()))
  }

  async fn generate_stream(
    &self,
    request: GenerationRequest,
  ) -> Result<BoxStream<'static, Result<GenerationChunk, GenerationError>>, GenerationError> {
    let mut words: Vec<String> = self
      .generate(request)
      .await?
      .split_whitespace()
      .map(|w| w.to_string())
      .collect();
    if words.is_empty() {
      words.push(String::new());
    }
    let last = words.len() - 1;

    Ok(Box::pin(futures::stream::iter(words.into_iter().enumerate().map(move |(i, w)| {
      let state = if i == last { StreamState::Reset } else { StreamState::Append };
      Ok(GenerationChunk { text: format!("{w} "), state })
    }))))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use futures::StreamExt;

  #[tokio::test]
  async fn streams_the_same_text_generate_returns() {
    let generator = FakeTextGenerator;
    let request = GenerationRequest::new("hello there");
    let full = generator.generate(request.clone()).await.unwrap();

    let mut stream = generator.generate_stream(request).await.unwrap();
    let mut streamed = String::new();
    while let Some(chunk) = stream.next().await {
      streamed.push_str(&chunk.unwrap().text);
    }
    assert_eq!(streamed.trim(), full.trim());
  }
}
