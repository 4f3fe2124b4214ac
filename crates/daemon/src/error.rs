//! HTTP-facing error aggregate. `core::ServiceError` only knows about
//! domain/tag errors (it can't depend on `db`/`pipeline`/`search` without a
//! dependency cycle), so this crate owns the aggregation the spec's
//! `ServiceError` text describes, one level further out.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
  #[error(transparent)]
  Service(#[from] memcore::error::ServiceError),
  #[error(transparent)]
  Orchestrator(#[from] pipeline::OrchestratorError),
  #[error(transparent)]
  Search(#[from] search::SearchError),
  #[error(transparent)]
  Db(#[from] db::DbError),
  #[error(transparent)]
  Tag(#[from] memcore::TagError),
  #[error(transparent)]
  Domain(#[from] memcore::DomainError),
  #[error("missing authorization header '{0}'")]
  MissingAuth(String),
  #[error("invalid access key")]
  InvalidAuth,
  #[error("{0}")]
  BadRequest(String),
  #[error("{item_type} '{id}' not found")]
  NotFound { item_type: &'static str, id: String },
}

#[derive(Serialize)]
struct ErrorBody {
  message: String,
  code: i32,
}

impl DaemonError {
  fn code(&self) -> i32 {
    match self {
      Self::Service(e) => e.code(),
      Self::MissingAuth(_) => -32010,
      Self::InvalidAuth => -32011,
      Self::BadRequest(_) => -32602,
      Self::NotFound { .. } => -32001,
      _ => -32000,
    }
  }
}

impl ResponseError for DaemonError {
  fn status_code(&self) -> StatusCode {
    match self {
      Self::Service(e) => StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
      Self::MissingAuth(_) => StatusCode::UNAUTHORIZED,
      Self::InvalidAuth => StatusCode::FORBIDDEN,
      Self::BadRequest(_) => StatusCode::BAD_REQUEST,
      Self::NotFound { .. } => StatusCode::NOT_FOUND,
      Self::Orchestrator(pipeline::OrchestratorError::PipelineNotFound { .. }) => StatusCode::NOT_FOUND,
      Self::Orchestrator(pipeline::OrchestratorError::Domain(_)) => StatusCode::BAD_REQUEST,
      Self::Tag(_) | Self::Domain(_) => StatusCode::BAD_REQUEST,
      _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn error_response(&self) -> HttpResponse {
    HttpResponse::build(self.status_code()).json(ErrorBody { message: self.to_string(), code: self.code() })
  }
}
