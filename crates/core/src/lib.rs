//! Shared domain model, configuration and error types for the memory
//! ingestion and retrieval service.

pub mod config;
pub mod domain;
pub mod error;
pub mod tags;

pub use config::Config;
pub use domain::{
  ArtifactType, Citation, CitationPartition, DataPipeline, DomainError, FileDescriptor,
  GeneratedFileDescriptor, MemoryRecord,
};
pub use error::ServiceError;
pub use tags::{TAG_DOCUMENT_ID, TAG_FILE_ID, TAG_FILE_PARTITION, TAG_FILE_TYPE, TagError, Tags};
