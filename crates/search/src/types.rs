//! Result shapes returned by `SearchClient`.

use llm::StreamState;
use memcore::Citation;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDetails {
  pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
  pub query: String,
  pub results: Vec<Citation>,
  pub no_result: bool,
  pub no_result_reason: Option<String>,
}

impl SearchResult {
  pub fn empty(query: impl Into<String>, reason: impl Into<String>) -> Self {
    Self { query: query.into(), results: Vec::new(), no_result: true, no_result_reason: Some(reason.into()) }
  }
}

/// Why an `Ask` didn't produce a grounded answer, distinguished so callers
/// can render a different message for "nothing in the index" versus "found
/// facts but couldn't fit them" versus "the model's answer was rejected".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
  Success,
  NoFacts,
  InsufficientTokens,
  UnsafeAnswer,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
  pub prompt_tokens: usize,
  pub completion_tokens: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryAnswer {
  pub question: String,
  pub text: String,
  pub result_kind: ResultKind,
  pub citations: Vec<Citation>,
  pub token_usage: TokenUsage,
  pub stream_state: StreamState,
}

impl MemoryAnswer {
  pub fn no_facts(question: impl Into<String>, empty_answer_text: &str) -> Self {
    Self {
      question: question.into(),
      text: empty_answer_text.to_string(),
      result_kind: ResultKind::NoFacts,
      citations: Vec::new(),
      token_usage: TokenUsage::default(),
      stream_state: StreamState::Reset,
    }
  }

  pub fn insufficient_tokens(question: impl Into<String>, empty_answer_text: &str) -> Self {
    Self {
      question: question.into(),
      text: empty_answer_text.to_string(),
      result_kind: ResultKind::InsufficientTokens,
      citations: Vec::new(),
      token_usage: TokenUsage::default(),
      stream_state: StreamState::Reset,
    }
  }

  pub fn unsafe_answer(question: impl Into<String>, moderated_text: &str, citations: Vec<Citation>) -> Self {
    Self {
      question: question.into(),
      text: moderated_text.to_string(),
      result_kind: ResultKind::UnsafeAnswer,
      citations,
      token_usage: TokenUsage::default(),
      stream_state: StreamState::Reset,
    }
  }
}
