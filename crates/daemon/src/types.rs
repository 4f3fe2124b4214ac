//! Request/response bodies for the HTTP surface.

use memcore::{DataPipeline, Tags};
use serde::{Deserialize, Serialize};

/// Projection of `DataPipeline` for `GET /upload-status`: every field a
/// caller can act on, with the transient and purge-bookkeeping fields
/// dropped (the latter can recurse arbitrarily and is an implementation
/// detail of consolidation, not something a status poller needs).
#[derive(Debug, Serialize)]
pub struct DataPipelineStatus {
  pub index: String,
  pub document_id: String,
  pub execution_id: uuid::Uuid,
  pub steps: Vec<String>,
  pub remaining_steps: Vec<String>,
  pub completed_steps: Vec<String>,
  pub tags: Tags,
  pub is_complete: bool,
  pub creation: chrono::DateTime<chrono::Utc>,
  pub last_update: chrono::DateTime<chrono::Utc>,
}

impl From<&DataPipeline> for DataPipelineStatus {
  fn from(p: &DataPipeline) -> Self {
    Self {
      index: p.index.clone(),
      document_id: p.document_id.clone(),
      execution_id: p.execution_id,
      steps: p.steps.clone(),
      remaining_steps: p.remaining_steps.clone(),
      completed_steps: p.completed_steps.clone(),
      tags: p.tags.clone(),
      is_complete: p.is_complete(),
      creation: p.creation,
      last_update: p.last_update,
    }
  }
}

#[derive(Debug, Serialize)]
pub struct UploadAccepted {
  pub document_id: String,
  pub index: String,
  pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadStatusQuery {
  pub index: String,
  pub document_id: String,
}

#[derive(Debug, Deserialize)]
pub struct IndexQuery {
  pub index: String,
}

#[derive(Debug, Deserialize)]
pub struct DocumentQuery {
  pub index: String,
  pub document_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
  pub question: String,
  pub index: String,
  #[serde(default)]
  pub filters: Vec<(String, String)>,
  #[serde(default)]
  pub min_relevance: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
  pub query: String,
  pub index: String,
  #[serde(default)]
  pub filters: Vec<(String, String)>,
  #[serde(default)]
  pub min_relevance: Option<f32>,
  #[serde(default)]
  pub limit: Option<usize>,
}
