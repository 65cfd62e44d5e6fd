//! Domain event system — lets a host observe a run without coupling to it.
//!
//! The orchestrator publishes as it moves between phases; the CLI subscribes
//! to print progress. Nobody listening is fine.

use crate::ops::Verdict;
use crate::phase::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// The orchestrator entered a phase
    PhaseEntered {
        phase: Phase,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },

    /// A model call completed
    ModelCalled {
        phase: Phase,
        model: String,
        tokens_used: Option<u32>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A review verdict was reached
    ReviewCompleted {
        verdict: Verdict,
        attempt: u32,
        explanation: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A file operation landed on disk
    ChangeApplied {
        path: String,
        kind: String,
        timestamp: DateTime<Utc>,
    },

    /// A top-level request reached a terminal phase
    RunFinished {
        phase: Phase,
        attempts: u32,
        error_message: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is not an error
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
