//! # Infrared Core
//!
//! Domain types, traits, and error definitions for the Infrared
//! plan → implement → review engine. This crate has **no I/O** of its own;
//! it defines the vocabulary every other crate speaks.
//!
//! ## Design Philosophy
//!
//! The model transport is a trait here ([`Provider`]); the HTTP implementation
//! lives in `infrared-providers` and tests plug in scripted mocks. Model output
//! enters the system only as one of the closed [`AssistantResponse`] variants.

pub mod error;
pub mod event;
pub mod message;
pub mod ops;
pub mod phase;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, Role, SessionId};
pub use ops::{AssistantResponse, FileCreateOp, FileEditOp, FileOp, Verdict};
pub use phase::Phase;
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
