//! Generation backed by OpenRouter's chat-completions endpoint.
//!
//! OpenRouter supports server-sent-event streaming, but parsing SSE here
//! would pull in another dependency for marginal benefit; instead we fetch
//! the whole completion and re-chunk it client-side in `generate_stream`,
//! matching the default `TextGenerator::generate_stream` behavior but with
//! word-level granularity so callers still see incremental output.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{GenerationChunk, GenerationError, GenerationRequest, StreamState, TextGenerator};

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

#[derive(Debug, Clone)]
pub struct OpenRouterGenerator {
  client: reqwest::Client,
  api_key: String,
  model: String,
}

impl OpenRouterGenerator {
  pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
    Self { client: reqwest::Client::new(), api_key: api_key.into(), model: model.into() }
  }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
  role: &'a str,
  content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
  model: &'a str,
  messages: Vec<ChatMessage<'a>>,
  max_tokens: usize,
  temperature: f32,
  top_p: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
  choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
  message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
  content: String,
}

#[async_trait]
impl TextGenerator for OpenRouterGenerator {
  fn name(&self) -> &str {
    "openrouter"
  }

  fn model_id(&self) -> &str {
    &self.model
  }

  async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
    let mut messages = Vec::new();
    if let Some(system) = &request.system_prompt {
      messages.push(ChatMessage { role: "system", content: system });
    }
    messages.push(ChatMessage { role: "user", content: &request.prompt });

    let body = ChatRequest {
      model: &self.model,
      messages,
      max_tokens: request.max_tokens,
      temperature: request.temperature,
      top_p: request.top_p,
    };

    debug!(model = %self.model, prompt_len = request.prompt.len(), "requesting generation from OpenRouter");

    let response = self
      .client
      .post(OPENROUTER_URL)
      .bearer_auth(&self.api_key)
      .json(&body)
      .send()
      .await?;

    if !response.status().is_success() {
      let status = response.status();
      let text = response.text().await.unwrap_or_default();
      warn!(%status, body = %text, "OpenRouter generation failed");
      return Err(GenerationError::ProviderError(format!("OpenRouter returned {status}: {text}")));
    }

    let parsed: ChatResponse = response.json().await?;
    parsed
      .choices
      .into_iter()
      .next()
      .map(|c| c.message.content)
      .ok_or_else(|| GenerationError::ProviderError("OpenRouter returned no choices".to_string()))
  }

  async fn generate_stream(
    &self,
    request: GenerationRequest,
  ) -> Result<BoxStream<'static, Result<GenerationChunk, GenerationError>>, GenerationError> {
    let text = self.generate(request).await?;
    let mut words: Vec<String> = text.split_whitespace().map(|w| w.to_string()).collect();
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
