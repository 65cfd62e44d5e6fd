//! File operations, review verdicts, and the structured model responses.

use serde::{Deserialize, Serialize};

/// A whole-file write proposed by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileCreateOp {
    /// Workspace-relative path
    pub path: String,

    /// Complete file content
    pub content: String,
}

/// A targeted replacement proposed by the model.
///
/// `original_snippet` must occur exactly once in the file when applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileEditOp {
    /// Workspace-relative path
    pub path: String,

    /// Exact text to be replaced
    pub original_snippet: String,

    /// Replacement text
    pub new_snippet: String,
}

/// One entry of a batch, in the order the batch is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOp {
    Create(FileCreateOp),
    Edit(FileEditOp),
}

impl FileOp {
    pub fn path(&self) -> &str {
        match self {
            FileOp::Create(op) => &op.path,
            FileOp::Edit(op) => &op.path,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FileOp::Create(_) => "new_file",
            FileOp::Edit(_) => "file_edit",
        }
    }
}

/// The Review phase outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    /// Changes solve the problem; apply them.
    #[serde(rename = "CORRECT")]
    Correct,

    /// Partially right; re-run implementation with the feedback.
    #[serde(rename = "NEED_CHANGES")]
    NeedChanges,

    /// Too broken to repair.
    #[serde(rename = "INCORRECT")]
    Incorrect,

    /// Scope creep or unrelated modifications.
    #[serde(rename = "UNNECESSARY", alias = "UNECESSARY")]
    Unnecessary,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Correct => "CORRECT",
            Verdict::NeedChanges => "NEED_CHANGES",
            Verdict::Incorrect => "INCORRECT",
            Verdict::Unnecessary => "UNNECESSARY",
        }
    }

    /// Parse the wire form. Accepts the historical `UNECESSARY` spelling.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s.trim() {
            "CORRECT" => Some(Verdict::Correct),
            "NEED_CHANGES" => Some(Verdict::NeedChanges),
            "INCORRECT" => Some(Verdict::Incorrect),
            "UNNECESSARY" | "UNECESSARY" => Some(Verdict::Unnecessary),
            _ => None,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model response after validation at the boundary.
///
/// Exactly one shape is populated; the parser decides which from the phase
/// that asked for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistantResponse {
    Plan {
        reply_text: String,
    },
    Implementation {
        reply_text: String,
        creates: Vec<FileCreateOp>,
        edits: Vec<FileEditOp>,
    },
    Review {
        verdict: Verdict,
        analysis: Option<String>,
        explanation: Option<String>,
    },
}

impl AssistantResponse {
    /// The batch in application order: creates first, then edits, each in
    /// the order the model listed them.
    pub fn operations(&self) -> Vec<FileOp> {
        match self {
            AssistantResponse::Implementation { creates, edits, .. } => creates
                .iter()
                .cloned()
                .map(FileOp::Create)
                .chain(edits.iter().cloned().map(FileOp::Edit))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            AssistantResponse::Plan { .. } => "plan",
            AssistantResponse::Implementation { .. } => "implementation",
            AssistantResponse::Review { .. } => "review",
        }
    }
}
