//! Query side of the system: embed a question, rank against a vector store,
//! and optionally synthesize a grounded, streamed answer.

pub mod client;
pub mod error;
pub mod types;

pub use client::{AskOptions, SearchClient};
pub use error::SearchError;
pub use types::{IndexDetails, MemoryAnswer, ResultKind, SearchResult, TokenUsage};
