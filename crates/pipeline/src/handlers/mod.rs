pub mod delete_document;
pub mod delete_index;
pub mod embed;
pub mod extract;
pub mod partition;
pub mod save_records;
pub mod summarize;

pub use delete_document::DeleteDocumentHandler;
pub use delete_index::DeleteIndexHandler;
pub use embed::EmbedHandler;
pub use extract::ExtractHandler;
pub use partition::PartitionHandler;
pub use save_records::SaveRecordsHandler;
pub use summarize::SummarizeHandler;

/// The default content-processing step order for a freshly imported document.
pub const DEFAULT_STEPS: &[&str] = &[
  extract::STEP_NAME,
  partition::STEP_NAME,
  summarize::STEP_NAME,
  embed::STEP_NAME,
  save_records::STEP_NAME,
];

/// Steps whose handlers remove the document/index directory the pipeline
/// status document itself lives in. The orchestrator skips the final
/// "persist completed status" step after one of these runs, since there's
/// no longer anywhere to persist it.
pub const DELETION_STEPS: &[&str] = &[delete_document::STEP_NAME, delete_index::STEP_NAME];

pub fn is_deletion_step(step: &str) -> bool {
  DELETION_STEPS.contains(&step)
}
