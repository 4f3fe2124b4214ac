//! The handler contract every pipeline step implements.

use async_trait::async_trait;
use memcore::DataPipeline;
use tokio_util::sync::CancellationToken;

use crate::error::HandlerError;

/// A single idempotent pipeline step.
///
/// `invoke` must be safe to call again on a pipeline that already carries
/// this step's output — handlers detect prior work through the pipeline's
/// artifacts (`already_processed_by`) and skip it rather than redo it.
/// Returning `Ok((false, pipeline))` tells the orchestrator the step made
/// no progress and should not be considered complete (used for cancellation
/// races); everything else returns `Ok((true, pipeline))`.
#[async_trait]
pub trait Handler: Send + Sync {
  fn step_name(&self) -> &'static str;

  async fn invoke(
    &self,
    pipeline: DataPipeline,
    cancel: CancellationToken,
  ) -> Result<(bool, DataPipeline), HandlerError>;
}
