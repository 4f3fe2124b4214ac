//! Text generation providers used by the search client to turn retrieved
//! facts into an answer, plus the content-moderation gate applied to
//! whatever comes back.

pub mod error;
pub mod fake;
pub mod moderation;
pub mod openrouter;
pub mod provider;

pub use error::GenerationError;
pub use fake::FakeTextGenerator;
pub use moderation::{ContentModerator, KeywordModerator, ModerationVerdict};
pub use openrouter::OpenRouterGenerator;
pub use provider::{GenerationChunk, GenerationRequest, StreamState, TextGenerator};
