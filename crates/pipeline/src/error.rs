#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
  #[error("unsupported mime type: {0}")]
  UnsupportedMime(String),
  #[error("extraction failed: {0}")]
  Extract(#[from] extract::ExtractError),
  #[error("embedding failed: {0}")]
  Embedding(#[from] embedding::EmbeddingError),
  #[error("generation failed: {0}")]
  Generation(#[from] llm::GenerationError),
  #[error("storage error: {0}")]
  Db(#[from] db::DbError),
  #[error("domain error: {0}")]
  Domain(#[from] memcore::DomainError),
  #[error("tag error: {0}")]
  Tag(#[from] memcore::TagError),
  #[error("step cancelled")]
  Cancelled,
  #[error("summary did not shrink after the first iteration, aborting to guard against a runaway generator")]
  SummaryNotShrinking,
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
  #[error("pipeline has no handler registered for step '{0}'")]
  UnknownStep(String),
  #[error(transparent)]
  Handler(#[from] HandlerError),
  #[error(transparent)]
  Db(#[from] db::DbError),
  #[error(transparent)]
  Domain(#[from] memcore::DomainError),
  #[error(transparent)]
  Tag(#[from] memcore::TagError),
  #[error("pipeline for index '{index}' document '{document_id}' not found")]
  PipelineNotFound { index: String, document_id: String },
}
