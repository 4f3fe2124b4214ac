#[derive(Debug, thiserror::Error)]
pub enum SearchError {
  #[error("storage error: {0}")]
  Db(#[from] db::DbError),
  #[error("embedding failed: {0}")]
  Embedding(#[from] embedding::EmbeddingError),
  #[error("generation failed: {0}")]
  Generation(#[from] llm::GenerationError),
}
