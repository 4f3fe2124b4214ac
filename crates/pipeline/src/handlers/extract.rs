use std::sync::Arc;

use async_trait::async_trait;
use db::ContentStore;
use extract::ExtractorRegistry;
use memcore::{ArtifactType, DataPipeline, GeneratedFileDescriptor};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::HandlerError;
use crate::handler::Handler;

pub const STEP_NAME: &str = "extract";

pub struct ExtractHandler {
  content_store: Arc<dyn ContentStore>,
  registry: Arc<ExtractorRegistry>,
}

impl ExtractHandler {
  pub fn new(content_store: Arc<dyn ContentStore>, registry: Arc<ExtractorRegistry>) -> Self {
    Self { content_store, registry }
  }
}

#[async_trait]
impl Handler for ExtractHandler {
  fn step_name(&self) -> &'static str {
    STEP_NAME
  }

  async fn invoke(
    &self,
    mut pipeline: DataPipeline,
    cancel: CancellationToken,
  ) -> Result<(bool, DataPipeline), HandlerError> {
    for file_index in 0..pipeline.files.len() {
      if cancel.is_cancelled() {
        return Err(HandlerError::Cancelled);
      }

      let (file_id, name, mime_type) = {
        let file = &pipeline.files[file_index];
        if file.artifacts_of_type(ArtifactType::ExtractedText).next().is_some() {
          continue;
        }
        (file.id, file.name.clone(), file.mime_type.clone())
      };

      debug!(file = %name, mime = %mime_type, "extracting text");
      let content = self
        .content_store
        .read_file(&pipeline.index, &pipeline.document_id, &name)
        .await
        .map_err(HandlerError::Db)?;

      let text = self.registry.extract(&mime_type, &content)?;
      let artifact_name = format!("{file_id}.extracted.txt");
      self
        .content_store
        .write_file(&pipeline.index, &pipeline.document_id, &artifact_name, text.as_bytes())
        .await
        .map_err(HandlerError::Db)?;

      // Markdown passes its MIME through so later steps (partitioning)
      // know to use the markdown-aware splitter; every other format
      // normalizes to plain text once extracted.
      let extracted_mime = if mime_type == "text/plain-markdown" { "text/plain-markdown" } else { "text/plain" };
      let artifact =
        GeneratedFileDescriptor::new(artifact_name, text.as_bytes(), extracted_mime, file_id, ArtifactType::ExtractedText);
      pipeline.files[file_index].record_artifact(artifact);
    }

    Ok((true, pipeline))
  }
}
