use std::sync::Arc;

use async_trait::async_trait;
use db::{ContentStore, VectorStore};
use memcore::DataPipeline;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::HandlerError;
use crate::handler::Handler;

pub const STEP_NAME: &str = "delete-index";

pub struct DeleteIndexHandler {
  content_store: Arc<dyn ContentStore>,
  vector_store: Arc<dyn VectorStore>,
}

impl DeleteIndexHandler {
  pub fn new(content_store: Arc<dyn ContentStore>, vector_store: Arc<dyn VectorStore>) -> Self {
    Self { content_store, vector_store }
  }
}

#[async_trait]
impl Handler for DeleteIndexHandler {
  fn step_name(&self) -> &'static str {
    STEP_NAME
  }

  async fn invoke(
    &self,
    pipeline: DataPipeline,
    _cancel: CancellationToken,
  ) -> Result<(bool, DataPipeline), HandlerError> {
    info!(index = %pipeline.index, "deleting index");
    self.vector_store.delete_index(&pipeline.index).await.map_err(HandlerError::Db)?;
    self.content_store.delete_index(&pipeline.index).await.map_err(HandlerError::Db)?;
    Ok((true, pipeline))
  }
}
