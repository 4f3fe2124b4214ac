//! Queue-backed orchestrator: each step has its own `QueueAdapter`, and a
//! worker pool drains them independently instead of one task walking a
//! pipeline start to finish.

use std::collections::HashMap;
use std::sync::Arc;

use db::ContentStore;
use memcore::{DataPipeline, FileDescriptor, Tags};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::OrchestratorError;
use crate::handler::Handler;
use crate::queue::{QueueAdapter, QueueMessage};

/// A handler bound to the named queue it consumes pointers from.
#[derive(Clone)]
struct BoundHandler {
  handler: Arc<dyn Handler>,
  queue: QueueAdapter,
}

#[derive(Clone, Default)]
pub struct QueueOrchestratorBuilder {
  bound: HashMap<&'static str, BoundHandler>,
}

impl QueueOrchestratorBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Attach a handler to its own queue. Queue parameters (visibility
  /// timeout, max attempts) are the same for every step; a deployment
  /// that needs per-step tuning can construct `QueueAdapter`s itself and
  /// use `attach_with_queue` instead.
  pub fn attach(&mut self, handler: Arc<dyn Handler>, visibility_timeout: std::time::Duration, max_attempts: u32) -> &mut Self {
    let queue = QueueAdapter::new(visibility_timeout, max_attempts);
    self.attach_with_queue(handler, queue)
  }

  pub fn attach_with_queue(&mut self, handler: Arc<dyn Handler>, queue: QueueAdapter) -> &mut Self {
    self.bound.insert(handler.step_name(), BoundHandler { handler, queue });
    self
  }

  pub fn queue_for(&self, step: &str) -> Option<QueueAdapter> {
    self.bound.get(step).map(|b| b.queue.clone())
  }

  pub fn build(&self, content_store: Arc<dyn ContentStore>) -> QueueBackedOrchestrator {
    QueueBackedOrchestrator { content_store, bound: self.bound.clone() }
  }
}

#[derive(Clone)]
pub struct QueueBackedOrchestrator {
  content_store: Arc<dyn ContentStore>,
  bound: HashMap<&'static str, BoundHandler>,
}

impl QueueBackedOrchestrator {
  fn queue_for(&self, step: &str) -> Option<QueueAdapter> {
    self.bound.get(step).map(|b| b.queue.clone())
  }

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
    self.enqueue_current_step(&pipeline).await?;
    Ok(pipeline)
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
    self.enqueue_current_step(&pipeline).await?;
    Ok(pipeline)
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
    self.enqueue_current_step(&pipeline).await?;
    Ok(pipeline)
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

  async fn enqueue_current_step(&self, pipeline: &DataPipeline) -> Result<(), OrchestratorError> {
    let Some(step) = pipeline.current_step() else {
      return Ok(());
    };
    let queue = self.queue_for(step).ok_or_else(|| OrchestratorError::UnknownStep(step.to_string()))?;
    queue.enqueue(QueueMessage::new(pipeline.index.clone(), pipeline.document_id.clone())).await;
    Ok(())
  }

  /// Run one worker loop for `step`, dequeuing pointers from its queue
  /// until `cancel` fires. Several of these may run concurrently against
  /// the same step's queue for parallelism.
  pub async fn run_worker(&self, step: &str, cancel: CancellationToken) -> Result<(), OrchestratorError> {
    let bound = self.bound.get(step).ok_or_else(|| OrchestratorError::UnknownStep(step.to_string()))?.clone();

    loop {
      let lease = tokio::select! {
        _ = cancel.cancelled() => break,
        lease = bound.queue.dequeue() => lease,
      };

      match self.process_one(&bound, &lease.message, step, &cancel).await {
        Ok(()) => bound.queue.ack(&lease.message).await,
        Err(err) => {
          error!(index = %lease.message.index, document_id = %lease.message.document_id, step, error = %err, "step failed, nacking");
          bound.queue.nack(lease.message).await;
        }
      }
    }

    Ok(())
  }

  /// Load-rollback-invoke-persist-enqueue for a single message.
  async fn process_one(
    &self,
    bound: &BoundHandler,
    message: &QueueMessage,
    step: &str,
    cancel: &CancellationToken,
  ) -> Result<(), OrchestratorError> {
    let mut pipeline = self
      .content_store
      .read_pipeline_status(&message.index, &message.document_id)
      .await?
      .ok_or_else(|| OrchestratorError::PipelineNotFound {
        index: message.index.clone(),
        document_id: message.document_id.clone(),
      })?;

    // A crash between persisting the advanced status and enqueuing onto the
    // next step's queue leaves the status one step ahead of the queue. The
    // message we were handed still names `step`, so roll the pipeline back
    // to it and re-persist before invoking the handler again.
    if pipeline.current_step() != Some(step) {
      if pipeline.rollback_step(step) {
        warn!(index = %pipeline.index, document_id = %pipeline.document_id, step, "recovered crash between persist and enqueue, rolling back one step");
        self.content_store.write_pipeline_status(&pipeline).await?;
      } else {
        return Err(OrchestratorError::UnknownStep(step.to_string()));
      }
    }

    info!(index = %pipeline.index, document_id = %pipeline.document_id, step, "running pipeline step");
    let (progressed, mut pipeline) = bound.handler.invoke(pipeline, cancel.clone()).await?;

    if progressed {
      pipeline.advance_step();
    }

    if pipeline.is_complete() && crate::handlers::is_deletion_step(step) {
      return Ok(());
    }
    self.content_store.write_pipeline_status(&pipeline).await?;
    self.enqueue_current_step(&pipeline).await?;
    Ok(())
  }
}
