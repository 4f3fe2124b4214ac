//! Unified service-level error, aggregating every component error with a
//! JSON-RPC-style code for the HTTP layer to map onto status codes.

use crate::{domain::DomainError, tags::TagError};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
  #[error("{item_type} not found: {id}")]
  NotFound { item_type: &'static str, id: String },
  #[error("Validation error: {0}")]
  Validation(String),
  #[error("Configuration error: {0}")]
  Configuration(String),
  #[error("Internal error: {0}")]
  Internal(String),
}

impl ServiceError {
  /// JSON-RPC-style code; the HTTP layer maps this onto a status.
  pub fn code(&self) -> i32 {
    match self {
      Self::Validation(_) => -32602,
      Self::NotFound { .. } => -32001,
      Self::Configuration(_) => -32002,
      Self::Internal(_) => -32000,
    }
  }

  pub fn http_status(&self) -> u16 {
    match self {
      Self::Validation(_) => 400,
      Self::NotFound { .. } => 404,
      Self::Configuration(_) => 500,
      Self::Internal(_) => 500,
    }
  }

  pub fn not_found(item_type: &'static str, id: impl Into<String>) -> Self {
    Self::NotFound { item_type, id: id.into() }
  }

  pub fn validation(msg: impl Into<String>) -> Self {
    Self::Validation(msg.into())
  }
}

impl From<DomainError> for ServiceError {
  fn from(e: DomainError) -> Self {
    Self::Validation(e.to_string())
  }
}

impl From<TagError> for ServiceError {
  fn from(e: TagError) -> Self {
    Self::Validation(e.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn validation_maps_to_400() {
    assert_eq!(ServiceError::validation("bad").http_status(), 400);
  }

  #[test]
  fn not_found_maps_to_404() {
    assert_eq!(ServiceError::not_found("pipeline", "x").http_status(), 404);
  }
}
