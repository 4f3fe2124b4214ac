use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use db::ContentStore;
use embedding::EmbeddingProvider;
use memcore::{ArtifactType, DataPipeline, GeneratedFileDescriptor};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::error::HandlerError;
use crate::handler::Handler;

pub const STEP_NAME: &str = "embed";

/// How many partitions to embed per provider call. Batching amortizes
/// per-request overhead without holding an unbounded number of texts in
/// memory for a very large document.
const BATCH_SIZE: usize = 32;

pub struct EmbedHandler {
  content_store: Arc<dyn ContentStore>,
  provider: Arc<dyn EmbeddingProvider>,
}

impl EmbedHandler {
  pub fn new(content_store: Arc<dyn ContentStore>, provider: Arc<dyn EmbeddingProvider>) -> Self {
    Self { content_store, provider }
  }
}

/// The JSON blob a `TextEmbeddingVector` artifact's content holds. Carries
/// the generator's identity alongside the vector itself, since a document
/// may later be re-embedded under a different model.
#[derive(Debug, Serialize, Deserialize)]
pub struct EmbeddingEnvelope {
  pub source_file_name: String,
  pub generator_provider: String,
  pub generator_name: String,
  pub vector: Vec<f32>,
  pub vector_size: usize,
  pub timestamp: chrono::DateTime<Utc>,
}

struct PendingArtifact {
  file_index: usize,
  parent_id: Uuid,
  artifact_name: String,
  text: String,
}

/// Turn an arbitrary provider/model pair into a filesystem-safe path
/// segment: lowercase ASCII alphanumerics and hyphens only.
fn sanitize_segment(raw: &str) -> String {
  raw
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
    .collect()
}

#[async_trait]
impl Handler for EmbedHandler {
  fn step_name(&self) -> &'static str {
    STEP_NAME
  }

  async fn invoke(
    &self,
    mut pipeline: DataPipeline,
    cancel: CancellationToken,
  ) -> Result<(bool, DataPipeline), HandlerError> {
    let mut pending = Vec::new();
    for (file_index, file) in pipeline.files.iter().enumerate() {
      for kind in [ArtifactType::TextPartition, ArtifactType::SyntheticData] {
        for artifact in file.artifacts_of_type(kind).filter(|a| !a.already_processed_by(STEP_NAME)) {
          pending.push((file_index, artifact.file.id, artifact.name().to_string()));
        }
      }
    }

    for chunk in pending.chunks(BATCH_SIZE) {
      if cancel.is_cancelled() {
        return Err(HandlerError::Cancelled);
      }

      let mut batch = Vec::with_capacity(chunk.len());
      for (file_index, parent_id, artifact_name) in chunk {
        let content = self
          .content_store
          .read_file(&pipeline.index, &pipeline.document_id, artifact_name)
          .await
          .map_err(HandlerError::Db)?;
        batch.push(PendingArtifact {
          file_index: *file_index,
          parent_id: *parent_id,
          artifact_name: artifact_name.clone(),
          text: String::from_utf8_lossy(&content).into_owned(),
        });
      }

      debug!(batch_size = batch.len(), "embedding partitions/summaries");
      let texts: Vec<&str> = batch.iter().map(|p| p.text.as_str()).collect();
      let vectors = self.provider.embed_batch(&texts).await?;

      for (item, vector) in batch.iter().zip(vectors.into_iter()) {
        let envelope = EmbeddingEnvelope {
          source_file_name: item.artifact_name.clone(),
          generator_provider: self.provider.name().to_string(),
          generator_name: self.provider.model_id().to_string(),
          vector_size: vector.len(),
          vector,
          timestamp: Utc::now(),
        };
        let envelope_json = serde_json::to_vec(&envelope).map_err(db::DbError::from)?;

        let provider_segment = sanitize_segment(&envelope.generator_provider);
        let model_segment = sanitize_segment(&envelope.generator_name);
        let vector_name = format!("{}.{provider_segment}.{model_segment}.text_embedding", item.artifact_name);
        self
          .content_store
          .write_file(&pipeline.index, &pipeline.document_id, &vector_name, &envelope_json)
          .await
          .map_err(HandlerError::Db)?;

        let artifact = GeneratedFileDescriptor::new(
          vector_name,
          &envelope_json,
          "application/json",
          item.parent_id,
          ArtifactType::TextEmbeddingVector,
        );
        pipeline.files[item.file_index].record_artifact(artifact);

        if let Some(source) = pipeline.files[item.file_index].generated_files.get_mut(&item.artifact_name) {
          source.mark_processed_by(STEP_NAME);
        }
      }
    }

    Ok((true, pipeline))
  }
}
