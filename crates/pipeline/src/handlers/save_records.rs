use std::sync::Arc;

use async_trait::async_trait;
use db::{ContentStore, VectorStore};
use memcore::{ArtifactType, DataPipeline, MemoryRecord, TAG_DOCUMENT_ID, TAG_FILE_ID, TAG_FILE_PARTITION};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::embed::EmbeddingEnvelope;
use crate::error::HandlerError;
use crate::handler::Handler;

pub const STEP_NAME: &str = "save-records";

pub struct SaveRecordsHandler {
  content_store: Arc<dyn ContentStore>,
  vector_store: Arc<dyn VectorStore>,
}

impl SaveRecordsHandler {
  pub fn new(content_store: Arc<dyn ContentStore>, vector_store: Arc<dyn VectorStore>) -> Self {
    Self { content_store, vector_store }
  }
}

/// `<artifact>.partition.<n>.txt` carries its ordinal in the name; anything
/// else (a summary, say) has no ordering of its own and is partition 0.
fn partition_number(source_file_name: &str) -> usize {
  source_file_name
    .split('.')
    .rev()
    .find_map(|segment| segment.parse::<usize>().ok())
    .filter(|_| source_file_name.contains(".partition."))
    .unwrap_or(0)
}

#[async_trait]
impl Handler for SaveRecordsHandler {
  fn step_name(&self) -> &'static str {
    STEP_NAME
  }

  async fn invoke(
    &self,
    mut pipeline: DataPipeline,
    cancel: CancellationToken,
  ) -> Result<(bool, DataPipeline), HandlerError> {
    self.vector_store.ensure_index(&pipeline.index).await.map_err(HandlerError::Db)?;

    let mut records = Vec::new();
    let mut processed_markers = Vec::new();

    for (file_index, file) in pipeline.files.iter().enumerate() {
      for vector_artifact in file.artifacts_of_type(ArtifactType::TextEmbeddingVector) {
        if vector_artifact.already_processed_by(STEP_NAME) {
          continue;
        }
        if cancel.is_cancelled() {
          return Err(HandlerError::Cancelled);
        }

        let envelope_bytes = self
          .content_store
          .read_file(&pipeline.index, &pipeline.document_id, vector_artifact.name())
          .await
          .map_err(HandlerError::Db)?;
        let envelope: EmbeddingEnvelope = serde_json::from_slice(&envelope_bytes).map_err(db::DbError::from)?;

        let Some(source) = file.generated_files.get(&envelope.source_file_name) else {
          continue;
        };
        let text_bytes = self
          .content_store
          .read_file(&pipeline.index, &pipeline.document_id, &envelope.source_file_name)
          .await
          .map_err(HandlerError::Db)?;
        let text = String::from_utf8_lossy(&text_bytes).into_owned();

        let mut tags = pipeline.tags.clone();
        tags.insert_reserved(TAG_DOCUMENT_ID, pipeline.document_id.clone());
        tags.insert_reserved(TAG_FILE_ID, file.id.to_string());
        tags.insert_reserved(TAG_FILE_PARTITION, envelope.source_file_name.clone());

        let mut payload = serde_json::Map::new();
        payload.insert("text".to_string(), serde_json::Value::String(text));
        payload.insert("artifact_type".to_string(), serde_json::to_value(source.artifact_type).unwrap_or_default());
        payload.insert("file_name".to_string(), serde_json::Value::String(file.name.clone()));
        payload.insert("partition_number".to_string(), partition_number(&envelope.source_file_name).into());
        payload.insert("section_number".to_string(), 0.into());
        payload.insert("last_update".to_string(), pipeline.last_update.to_rfc3339().into());
        payload.insert("vector_provider".to_string(), envelope.generator_provider.clone().into());
        payload.insert("vector_model".to_string(), envelope.generator_name.clone().into());

        records.push(MemoryRecord {
          id: MemoryRecord::deterministic_id(&pipeline.document_id, &envelope.source_file_name),
          vector: envelope.vector,
          tags,
          payload,
        });
        processed_markers.push((file_index, vector_artifact.name().to_string()));
      }
    }

    if pipeline.previous_executions_to_purge.is_empty() {
      if !records.is_empty() {
        debug!(count = records.len(), index = %pipeline.index, "saving memory records");
        self.vector_store.upsert(&pipeline.index, &records).await.map_err(HandlerError::Db)?;
      }
    } else {
      self.consolidate_previous_executions(&pipeline, &records).await?;
    }

    for (file_index, vector_name) in processed_markers {
      if let Some(artifact) = pipeline.files[file_index].generated_files.get_mut(&vector_name) {
        artifact.mark_processed_by(STEP_NAME);
      }
    }
    pipeline.previous_executions_to_purge.clear();

    Ok((true, pipeline))
  }
}

impl SaveRecordsHandler {
  /// Drop every record this document has under `index`, then reinsert only
  /// what the current execution produced. Every record carries the
  /// `__document_id` tag, so dropping by that filter and reinserting the
  /// retain set is equivalent to (and simpler than) diffing the previous
  /// executions' own record ids against the new ones — the end state is
  /// the same either way. This is what reclaims storage from a superseded
  /// version after a re-upload.
  async fn consolidate_previous_executions(
    &self,
    pipeline: &DataPipeline,
    new_records: &[MemoryRecord],
  ) -> Result<(), HandlerError> {
    debug!(index = %pipeline.index, document_id = %pipeline.document_id, retained = new_records.len(), "consolidating previous execution");
    self.vector_store.delete_by_document(&pipeline.index, &pipeline.document_id).await.map_err(HandlerError::Db)?;
    if !new_records.is_empty() {
      self.vector_store.upsert(&pipeline.index, new_records).await.map_err(HandlerError::Db)?;
    }
    Ok(())
  }
}
