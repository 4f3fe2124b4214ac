use std::sync::Arc;

use async_trait::async_trait;
use db::{ContentStore, VectorStore};
use memcore::DataPipeline;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::HandlerError;
use crate::handler::Handler;

pub const STEP_NAME: &str = "delete-document";

pub struct DeleteDocumentHandler {
  content_store: Arc<dyn ContentStore>,
  vector_store: Arc<dyn VectorStore>,
}

impl DeleteDocumentHandler {
  pub fn new(content_store: Arc<dyn ContentStore>, vector_store: Arc<dyn VectorStore>) -> Self {
    Self { content_store, vector_store }
  }
}

#[async_trait]
impl Handler for DeleteDocumentHandler {
  fn step_name(&self) -> &'static str {
    STEP_NAME
  }

  async fn invoke(
    &self,
    pipeline: DataPipeline,
    _cancel: CancellationToken,
  ) -> Result<(bool, DataPipeline), HandlerError> {
    info!(index = %pipeline.index, document_id = %pipeline.document_id, "deleting document");
    self.vector_store.delete_by_document(&pipeline.index, &pipeline.document_id).await.map_err(HandlerError::Db)?;
    self.content_store.delete_document(&pipeline.index, &pipeline.document_id).await.map_err(HandlerError::Db)?;
    Ok((true, pipeline))
  }
}
