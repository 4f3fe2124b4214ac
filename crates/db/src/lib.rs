//! Storage layer: a filesystem `ContentStore` for raw/derived files and
//! pipeline status, and a LanceDB-backed `VectorStore` for memory records.

pub mod content_store;
pub mod error;
pub mod vector_store;

pub use content_store::{ContentStore, FsContentStore};
pub use error::{DbError, Result};
pub use vector_store::{LanceVectorStore, ScoredRecord, VectorStore};
