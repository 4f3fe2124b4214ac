//! Ingestion handlers and the two orchestrator variants that drive them
//! through a `DataPipeline`'s steps.

pub mod error;
pub mod handler;
pub mod handlers;
pub mod orchestrator;
pub mod queue;
pub mod queue_orchestrator;

pub use error::{HandlerError, OrchestratorError};
pub use handler::Handler;
pub use orchestrator::{HandlerRegistry, InProcessOrchestrator};
pub use queue::{QueueAdapter, QueueMessage};
pub use queue_orchestrator::{QueueBackedOrchestrator, QueueOrchestratorBuilder};
