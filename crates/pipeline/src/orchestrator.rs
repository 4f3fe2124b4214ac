//! Shared orchestrator plumbing: handler registry, document import, and the
//! synchronous in-process execution loop.

use std::collections::HashMap;
use std::sync::Arc;

use db::ContentStore;
use memcore::{DataPipeline, FileDescriptor, Tags};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::OrchestratorError;
use crate::handler::Handler;

#[derive(Clone, Default)]
pub struct HandlerRegistry {
  handlers: HashMap<&'static str, Arc<dyn Handler>>,
}

impl HandlerRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&mut self, handler: Arc<dyn Handler>) -> &mut Self {
    self.handlers.insert(handler.step_name(), handler);
    self
  }

  pub fn get(&self, step: &str) -> Option<Arc<dyn Handler>> {
    self.handlers.get(step).cloned()
  }
}

/// Runs pipelines synchronously, in the caller's own task: every step
/// completes before `import_document`/`delete_document`/`delete_index`
/// returns. This is the orchestrator variant a CLI or a single-process
/// HTTP server uses when there's no separate worker pool.
pub struct InProcessOrchestrator {
  content_store: Arc<dyn ContentStore>,
  handlers: HandlerRegistry,
}

impl InProcessOrchestrator {
  pub fn new(content_store: Arc<dyn ContentStore>, handlers: HandlerRegistry) -> Self {
    Self { content_store, handlers }
  }

  /// Upload files, build the pipeline, and run it to completion.
  ///
  /// Files are written before the status document (status-after-files
  /// rule). If a pipeline already exists for `(index, documentId)` under a
  /// different execution, it's captured for later purge rather than lost.
  pub async fn import_document(
    &self,
    index: &str,
    document_id: &str,
    tags: Tags,
    steps: Vec<String>,
    files: Vec<(FileDescriptor, Vec<u8>)>,
  ) -> Result<DataPipeline, OrchestratorError> {
    for (descriptor, content) in &files {
      self.content_store.write_file(index, document_id, &descriptor.name, content).await?;
    }
    let descriptors = files.into_iter().map(|(d, _)| d).collect();

    let mut pipeline = DataPipeline::new(index.to_string(), document_id.to_string(), steps, tags, descriptors)?;

    if let Some(previous) = self.content_store.read_pipeline_status(index, document_id).await? {
      pipeline.capture_previous_execution(previous);
    }

    self.content_store.write_pipeline_status(&pipeline).await?;
    self.run_to_completion(pipeline, CancellationToken::new()).await
  }

  pub async fn start_document_deletion(&self, index: &str, document_id: &str) -> Result<DataPipeline, OrchestratorError> {
    let pipeline = DataPipeline::new(
      index.to_string(),
      document_id.to_string(),
      vec![crate::handlers::delete_document::STEP_NAME.to_string()],
      Tags::new(),
      vec![],
    )?;
    self.content_store.write_pipeline_status(&pipeline).await?;
    self.run_to_completion(pipeline, CancellationToken::new()).await
  }

  pub async fn start_index_deletion(&self, index: &str) -> Result<DataPipeline, OrchestratorError> {
    let pipeline = DataPipeline::new(
      index.to_string(),
      format!("__index_deletion_{index}"),
      vec![crate::handlers::delete_index::STEP_NAME.to_string()],
      Tags::new(),
      vec![],
    )?;
    self.content_store.write_pipeline_status(&pipeline).await?;
    self.run_to_completion(pipeline, CancellationToken::new()).await
  }

  pub async fn read_pipeline_status(
    &self,
    index: &str,
    document_id: &str,
  ) -> Result<Option<DataPipeline>, OrchestratorError> {
    Ok(self.content_store.read_pipeline_status(index, document_id).await?)
  }

  pub async fn is_document_ready(&self, index: &str, document_id: &str) -> Result<bool, OrchestratorError> {
    Ok(self
      .content_store
      .read_pipeline_status(index, document_id)
      .await?
      .is_some_and(|p| p.is_complete() && !p.files.is_empty()))
  }

  /// Read a file scoped to `pipeline`'s own index/document, raw or source
  /// or generated artifact.
  pub async fn read_file(&self, pipeline: &DataPipeline, name: &str) -> Result<Vec<u8>, OrchestratorError> {
    Ok(self.content_store.read_file(&pipeline.index, &pipeline.document_id, name).await?)
  }

  pub async fn write_file(&self, pipeline: &DataPipeline, name: &str, content: &[u8]) -> Result<(), OrchestratorError> {
    Ok(self.content_store.write_file(&pipeline.index, &pipeline.document_id, name, content).await?)
  }

  pub async fn read_text_file(&self, pipeline: &DataPipeline, name: &str) -> Result<String, OrchestratorError> {
    let bytes = self.read_file(pipeline, name).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
  }

  pub async fn write_text_file(&self, pipeline: &DataPipeline, name: &str, content: &str) -> Result<(), OrchestratorError> {
    self.write_file(pipeline, name, content.as_bytes()).await
  }

  /// Step 1-4 of the in-process variant: invoke, advance, persist, repeat.
  /// A handler error is raised directly — the status document on disk
  /// still points at the failed step, for a later retry to pick up.
  pub async fn run_to_completion(
    &self,
    mut pipeline: DataPipeline,
    cancel: CancellationToken,
  ) -> Result<DataPipeline, OrchestratorError> {
    while let Some(step) = pipeline.current_step().map(str::to_string) {
      if cancel.is_cancelled() {
        warn!(index = %pipeline.index, document_id = %pipeline.document_id, step, "pipeline cancelled");
        break;
      }

      let handler = self.handlers.get(&step).ok_or_else(|| OrchestratorError::UnknownStep(step.clone()))?;
      info!(index = %pipeline.index, document_id = %pipeline.document_id, step = %step, "running pipeline step");
      let (progressed, updated) = handler.invoke(pipeline, cancel.clone()).await?;
      pipeline = updated;

      if progressed {
        pipeline.advance_step();
      }

      if pipeline.is_complete() && crate::handlers::is_deletion_step(&step) {
        // The handler just removed the directory this status document lives
        // in; persisting now would only recreate it.
        break;
      }
      self.content_store.write_pipeline_status(&pipeline).await?;
    }

    Ok(pipeline)
  }
}
