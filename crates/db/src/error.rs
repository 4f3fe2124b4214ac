use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
  #[error("io error at {path}: {source}")]
  Io { path: PathBuf, source: std::io::Error },
  #[error("serialization error: {0}")]
  Serde(#[from] serde_json::Error),
  #[error("vector store error: {0}")]
  Lance(#[from] lancedb::Error),
  #[error("arrow error: {0}")]
  Arrow(#[from] arrow_schema::ArrowError),
  #[error("{item_type} not found: {id}")]
  NotFound { item_type: &'static str, id: String },
  #[error("invalid input: {0}")]
  InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, DbError>;
