//! Content moderation gate applied to generated answers before they reach
//! the caller.

use async_trait::async_trait;

use crate::GenerationError;

#[derive(Debug, Clone)]
pub struct ModerationVerdict {
  pub is_safe: bool,
  pub reason: Option<String>,
}

impl ModerationVerdict {
  pub fn safe() -> Self {
    Self { is_safe: true, reason: None }
  }

  pub fn unsafe_because(reason: impl Into<String>) -> Self {
    Self { is_safe: false, reason: Some(reason.into()) }
  }
}

#[async_trait]
pub trait ContentModerator: Send + Sync {
  async fn moderate(&self, text: &str) -> Result<ModerationVerdict, GenerationError>;
}

/// Keyword-based moderator used when no external moderation API is
/// configured. Deliberately conservative: a hit on any banned phrase trips
/// the gate, with no partial credit.
#[derive(Debug, Clone)]
pub struct KeywordModerator {
  banned_phrases: Vec<String>,
}

impl KeywordModerator {
  pub fn new(banned_phrases: Vec<String>) -> Self {
    Self { banned_phrases: banned_phrases.into_iter().map(|p| p.to_lowercase()).collect() }
  }
}

impl Default for KeywordModerator {
  fn default() -> Self {
    Self::new(Vec::new())
  }
}

#[async_trait]
impl ContentModerator for KeywordModerator {
  async fn moderate(&self, text: &str) -> Result<ModerationVerdict, GenerationError> {
    let lowered = text.to_lowercase();
    for phrase in &self.banned_phrases {
      if lowered.contains(phrase.as_str()) {
        return Ok(ModerationVerdict::unsafe_because(format!("matched banned phrase '{phrase}'")));
      }
    }
    Ok(ModerationVerdict::safe())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn flags_banned_phrase() {
    let moderator = KeywordModerator::new(vec!["forbidden".to_string()]);
    let verdict = moderator.moderate("this contains a Forbidden word").await.unwrap();
    assert!(!verdict.is_safe);
  }

  #[tokio::test]
  async fn passes_clean_text() {
    let moderator = KeywordModerator::new(vec!["forbidden".to_string()]);
    let verdict = moderator.moderate("this is fine").await.unwrap();
    assert!(verdict.is_safe);
  }

  #[tokio::test]
  async fn empty_phrase_list_passes_everything() {
    let moderator = KeywordModerator::default();
    assert!(moderator.moderate("anything at all").await.unwrap().is_safe);
  }
}
