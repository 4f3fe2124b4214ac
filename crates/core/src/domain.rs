//! Core data model: pipelines, file descriptors and memory records.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::tags::Tags;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
  #[error("index name '{0}' is invalid: must be lowercase alphanumerics and hyphens, 1-64 chars")]
  InvalidIndexName(String),
  #[error("step '{0}' is chained to itself")]
  DuplicateConsecutiveStep(String),
}

/// Normalize and validate a caller-supplied index name.
///
/// Lowercases, then checks the result only contains `[a-z0-9-]` and is
/// 1-64 characters long.
pub fn normalize_index_name(raw: &str) -> Result<String, DomainError> {
  let lower = raw.to_lowercase();
  let valid = !lower.is_empty()
    && lower.len() <= 64
    && lower.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
  if !valid {
    return Err(DomainError::InvalidIndexName(raw.to_string()));
  }
  Ok(lower)
}

/// Validate that no two consecutive steps in a plan are identical.
pub fn validate_step_plan(steps: &[String]) -> Result<(), DomainError> {
  for pair in steps.windows(2) {
    if pair[0] == pair[1] {
      return Err(DomainError::DuplicateConsecutiveStep(pair[0].clone()));
    }
  }
  Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
  ExtractedText,
  TextPartition,
  SyntheticData,
  TextEmbeddingVector,
  Summary,
}

/// A source file (or derived artifact) tracked by a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDescriptor {
  pub id: Uuid,
  pub name: String,
  pub size: u64,
  pub mime_type: String,
  pub content_sha256: String,
  #[serde(default)]
  pub generated_files: HashMap<String, GeneratedFileDescriptor>,
}

impl FileDescriptor {
  pub fn new(name: impl Into<String>, content: &[u8], mime_type: impl Into<String>) -> Self {
    use sha2::{Digest, Sha256};
    let hash = Sha256::digest(content);
    Self {
      id: Uuid::new_v4(),
      name: name.into(),
      size: content.len() as u64,
      mime_type: mime_type.into(),
      content_sha256: hex::encode(hash),
      generated_files: HashMap::new(),
    }
  }

  /// Record (or refresh) a generated artifact under this file, keyed by name.
  pub fn record_artifact(&mut self, artifact: GeneratedFileDescriptor) {
    self.generated_files.insert(artifact.file.name.clone(), artifact);
  }

  pub fn artifacts_of_type(&self, kind: ArtifactType) -> impl Iterator<Item = &GeneratedFileDescriptor> {
    self.generated_files.values().filter(move |a| a.artifact_type == kind)
  }
}

/// An artifact produced by a handler acting on a `FileDescriptor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedFileDescriptor {
  #[serde(flatten)]
  pub file: FileDescriptor,
  pub parent_id: Uuid,
  pub artifact_type: ArtifactType,
  #[serde(default)]
  pub processed_by: HashSet<String>,
}

impl GeneratedFileDescriptor {
  pub fn new(
    name: impl Into<String>,
    content: &[u8],
    mime_type: impl Into<String>,
    parent_id: Uuid,
    artifact_type: ArtifactType,
  ) -> Self {
    Self {
      file: FileDescriptor::new(name, content, mime_type),
      parent_id,
      artifact_type,
      processed_by: HashSet::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.file.name
  }

  /// Whether `handler_name` has already processed this artifact — the
  /// idempotency gate handlers must consult before doing any work.
  pub fn already_processed_by(&self, handler_name: &str) -> bool {
    self.processed_by.contains(handler_name)
  }

  pub fn mark_processed_by(&mut self, handler_name: &str) {
    self.processed_by.insert(handler_name.to_string());
  }
}

/// The durable status document for one pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPipeline {
  pub index: String,
  pub document_id: String,
  pub execution_id: Uuid,
  pub steps: Vec<String>,
  pub remaining_steps: Vec<String>,
  pub completed_steps: Vec<String>,
  #[serde(default)]
  pub tags: Tags,
  #[serde(default)]
  pub files: Vec<FileDescriptor>,
  #[serde(default)]
  pub previous_executions_to_purge: Vec<Box<DataPipeline>>,
  pub creation: DateTime<Utc>,
  pub last_update: DateTime<Utc>,
  /// Transient: never persisted, always false on read.
  #[serde(skip)]
  pub upload_complete: bool,
}

impl DataPipeline {
  pub fn new(
    index: String,
    document_id: String,
    steps: Vec<String>,
    tags: Tags,
    files: Vec<FileDescriptor>,
  ) -> Result<Self, DomainError> {
    validate_step_plan(&steps)?;
    let now = Utc::now();
    Ok(Self {
      index,
      document_id,
      execution_id: Uuid::new_v4(),
      remaining_steps: steps.clone(),
      completed_steps: Vec::new(),
      steps,
      tags,
      files,
      previous_executions_to_purge: Vec::new(),
      creation: now,
      last_update: now,
      upload_complete: false,
    })
  }

  pub fn is_complete(&self) -> bool {
    self.remaining_steps.is_empty()
  }

  pub fn current_step(&self) -> Option<&str> {
    self.remaining_steps.first().map(|s| s.as_str())
  }

  /// Move the head of `remaining_steps` to the tail of `completed_steps`.
  /// Returns the step name that was advanced, or `None` if already complete.
  pub fn advance_step(&mut self) -> Option<String> {
    if self.remaining_steps.is_empty() {
      return None;
    }
    let step = self.remaining_steps.remove(0);
    self.completed_steps.push(step.clone());
    self.last_update = Utc::now();
    Some(step)
  }

  /// Roll `step` back from `completed_steps` to the head of `remaining_steps`.
  /// Used by the queue-backed orchestrator's rollback-on-mismatch recovery.
  pub fn rollback_step(&mut self, step: &str) -> bool {
    if self.completed_steps.last().map(|s| s.as_str()) != Some(step) {
      return false;
    }
    self.completed_steps.pop();
    self.remaining_steps.insert(0, step.to_string());
    self.last_update = Utc::now();
    true
  }

  /// Record `other` as a previous execution to purge, flattening its own
  /// purge list into ours first so the tree never grows past one level deep.
  pub fn capture_previous_execution(&mut self, mut other: DataPipeline) {
    let mut flattened = std::mem::take(&mut other.previous_executions_to_purge);
    self.previous_executions_to_purge.append(&mut flattened);
    self.previous_executions_to_purge.push(Box::new(other));
  }

  pub fn find_file(&self, id: Uuid) -> Option<&FileDescriptor> {
    self.files.iter().find(|f| f.id == id)
  }

  pub fn find_file_mut(&mut self, id: Uuid) -> Option<&mut FileDescriptor> {
    self.files.iter_mut().find(|f| f.id == id)
  }
}

/// A (vector, tags, payload) record stored in a VectorStore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
  pub id: String,
  pub vector: Vec<f32>,
  pub tags: Tags,
  pub payload: serde_json::Map<String, serde_json::Value>,
}

impl MemoryRecord {
  /// Deterministic record id: `d=<documentId>//p=<partitionId>`.
  pub fn deterministic_id(document_id: &str, partition_id: &str) -> String {
    format!("d={document_id}//p={partition_id}")
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationPartition {
  pub text: String,
  pub relevance: f32,
  pub partition_number: usize,
  pub section_number: usize,
  pub last_update: DateTime<Utc>,
  pub tags: Tags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
  pub index: String,
  pub document_id: String,
  pub file_id: Uuid,
  pub link: String,
  pub source_name: String,
  pub source_url: Option<String>,
  pub content_type: String,
  pub partitions: Vec<CitationPartition>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalizes_and_validates_index_names() {
    assert_eq!(normalize_index_name("My-Index").unwrap(), "my-index");
    assert!(normalize_index_name("bad index").is_err());
    assert!(normalize_index_name("").is_err());
  }

  #[test]
  fn rejects_self_chained_steps() {
    let steps = vec!["extract".to_string(), "extract".to_string()];
    assert!(validate_step_plan(&steps).is_err());
  }

  #[test]
  fn advance_and_rollback_round_trip() {
    let mut pipeline = DataPipeline::new(
      "idx".into(),
      "doc1".into(),
      vec!["extract".into(), "partition".into()],
      Tags::new(),
      vec![],
    )
    .unwrap();

    assert_eq!(pipeline.current_step(), Some("extract"));
    let stepped = pipeline.advance_step().unwrap();
    assert_eq!(stepped, "extract");
    assert_eq!(pipeline.completed_steps, vec!["extract".to_string()]);
    assert_eq!(pipeline.remaining_steps, vec!["partition".to_string()]);

    assert!(pipeline.rollback_step("extract"));
    assert!(pipeline.completed_steps.is_empty());
    assert_eq!(pipeline.remaining_steps, vec!["extract".to_string(), "partition".to_string()]);
  }

  #[test]
  fn capture_previous_execution_flattens_one_level() {
    let mut grandparent = DataPipeline::new("idx".into(), "doc1".into(), vec!["extract".into()], Tags::new(), vec![]).unwrap();
    let mut parent = DataPipeline::new("idx".into(), "doc1".into(), vec!["extract".into()], Tags::new(), vec![]).unwrap();
    parent.capture_previous_execution(grandparent.clone());
    assert_eq!(parent.previous_executions_to_purge.len(), 1);

    let mut child = DataPipeline::new("idx".into(), "doc1".into(), vec!["extract".into()], Tags::new(), vec![]).unwrap();
    child.capture_previous_execution(parent);
    // flattened: grandparent's entry plus parent itself, parent's own list cleared
    assert_eq!(child.previous_executions_to_purge.len(), 2);
    assert!(child.previous_executions_to_purge.iter().all(|p| p.previous_executions_to_purge.is_empty()));
    let _ = grandparent.advance_step();
  }

  #[test]
  fn deterministic_record_id_depends_only_on_document_and_partition() {
    let a = MemoryRecord::deterministic_id("doc1", "p0");
    let b = MemoryRecord::deterministic_id("doc1", "p0");
    assert_eq!(a, b);
    assert_eq!(a, "d=doc1//p=p0");
  }
}
