//! Phases of one top-level request.

use serde::{Deserialize, Serialize};

/// The orchestrator's state for the request currently being served.
///
/// `Planning`, `Implementing` and `Reviewing` each issue one model call.
/// `Applying` mutates the filesystem. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Planning,
    Implementing,
    Reviewing,
    Applying,
    Done,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Planning => "PLANNING",
            Phase::Implementing => "IMPLEMENTING",
            Phase::Reviewing => "REVIEWING",
            Phase::Applying => "APPLYING",
            Phase::Done => "DONE",
            Phase::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
