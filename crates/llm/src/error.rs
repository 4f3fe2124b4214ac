#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
  #[error("generation request failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("provider error: {0}")]
  ProviderError(String),
  #[error("generation provider not configured: {0}")]
  NotConfigured(String),
}
