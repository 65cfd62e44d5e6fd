//! The Infrared engine: plan, implement, review, apply.
//!
//! - [`snippet`]: exact-match single-occurrence replacement
//! - [`materializer`]: validated, atomic workspace writes
//! - [`context`]: ordered conversation history with budget trimming
//! - [`parse`]: model text → [`infrared_core::AssistantResponse`]
//! - [`orchestrator`]: the phase machine and bounded review loop

pub mod context;
pub mod materializer;
pub mod orchestrator;
pub mod overlay;
pub mod parse;
pub mod prompts;
pub mod snippet;
pub mod token;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{ConversationContext, ConversationEntry, EntryKind, TrimReport};
pub use materializer::Materializer;
pub use orchestrator::{
    AppliedChange, CancelToken, Orchestrator, OrchestratorSettings, RetryState, ReviewOutcome,
    RunReport,
};
