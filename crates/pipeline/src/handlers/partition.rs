use std::sync::Arc;

use async_trait::async_trait;
use db::ContentStore;
use extract::{PartitionOptions, partition_text};
use memcore::{ArtifactType, DataPipeline, GeneratedFileDescriptor};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::HandlerError;
use crate::handler::Handler;

pub const STEP_NAME: &str = "partition";

pub struct PartitionHandler {
  content_store: Arc<dyn ContentStore>,
  options: PartitionOptions,
}

impl PartitionHandler {
  pub fn new(content_store: Arc<dyn ContentStore>, options: PartitionOptions) -> Self {
    Self { content_store, options }
  }
}

#[async_trait]
impl Handler for PartitionHandler {
  fn step_name(&self) -> &'static str {
    STEP_NAME
  }

  async fn invoke(
    &self,
    mut pipeline: DataPipeline,
    cancel: CancellationToken,
  ) -> Result<(bool, DataPipeline), HandlerError> {
    for file_index in 0..pipeline.files.len() {
      let extracted_artifacts: Vec<(String, String, String)> = pipeline.files[file_index]
        .artifacts_of_type(ArtifactType::ExtractedText)
        .filter(|a| !a.already_processed_by(STEP_NAME))
        .map(|a| (a.file.id.to_string(), a.name().to_string(), a.file.mime_type.clone()))
        .collect();

      for (artifact_id, artifact_name, mime_type) in extracted_artifacts {
        if cancel.is_cancelled() {
          return Err(HandlerError::Cancelled);
        }

        debug!(artifact = %artifact_name, "partitioning extracted text");
        let content = self
          .content_store
          .read_file(&pipeline.index, &pipeline.document_id, &artifact_name)
          .await
          .map_err(HandlerError::Db)?;
        let text = String::from_utf8_lossy(&content).into_owned();

        // Markdown gets the markdown-aware splitter, everything else the
        // generic one, regardless of how `self.options` was constructed.
        let options = PartitionOptions { markdown_aware: mime_type == "text/plain-markdown", ..self.options };
        let partitions = partition_text(&text, &options);

        let parent_id = pipeline.files[file_index].id;
        for (i, partition) in partitions.iter().enumerate() {
          let partition_name = format!("{artifact_id}.partition.{i}.txt");
          self
            .content_store
            .write_file(&pipeline.index, &pipeline.document_id, &partition_name, partition.as_bytes())
            .await
            .map_err(HandlerError::Db)?;

          let artifact = GeneratedFileDescriptor::new(
            partition_name,
            partition.as_bytes(),
            "text/plain",
            parent_id,
            ArtifactType::TextPartition,
          );
          pipeline.files[file_index].record_artifact(artifact);
        }

        if let Some(extracted) = pipeline.files[file_index].generated_files.get_mut(&artifact_name) {
          extracted.mark_processed_by(STEP_NAME);
        }
      }
    }

    Ok((true, pipeline))
  }
}
