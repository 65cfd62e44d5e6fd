//! Conversation context — the ordered history every model request is built from.
//!
//! Entries are only ever appended; their relative order never changes. Trimming
//! removes entries but never reorders the survivors. During a review cycle
//! trimming is suspended so the feedback the next attempt depends on stays put.

use crate::materializer::normalize;
use crate::prompts;
use crate::token;
use infrared_core::message::{Message, Role};
use serde::{Deserialize, Serialize};

/// What an entry is for. Lets phases pick the parts of history they need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryKind {
    /// A standing system prompt
    Prompt,
    /// Contents of a workspace file
    File { path: String },
    /// A top-level user request
    Request,
    /// Planning output
    Plan,
    /// Implementation reply text
    Implementation,
    /// Review feedback for the next attempt
    Feedback,
    /// Record of a file operation
    Note,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub content: String,
    /// Assigned at append, strictly increasing
    pub created_order: u64,
    pub kind: EntryKind,
}

impl ConversationEntry {
    pub fn to_message(&self) -> Message {
        Message::new(self.role, self.content.clone())
    }

    pub fn estimated_tokens(&self) -> usize {
        token::estimate_entry_tokens(&self.content)
    }
}

/// Outcome of a trim pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrimReport {
    pub dropped: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
    /// A review cycle was in progress; nothing was touched
    pub deferred: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    entries: Vec<ConversationEntry>,
    next_order: u64,
    in_review_cycle: bool,
}

impl ConversationContext {
    /// A context seeded with one standing system prompt.
    pub fn new(system_prompt: &str) -> Self {
        let mut ctx = Self::default();
        ctx.append(Role::System, EntryKind::Prompt, system_prompt);
        ctx
    }

    /// Append an entry at the end. Returns its `created_order`.
    pub fn append(&mut self, role: Role, kind: EntryKind, content: impl Into<String>) -> u64 {
        let created_order = self.next_order;
        self.next_order += 1;
        self.entries.push(ConversationEntry {
            role,
            content: content.into(),
            created_order,
            kind,
        });
        created_order
    }

    /// Record a file's content. Re-adding a path replaces its entry in place.
    pub fn add_file(&mut self, path: &str, content: &str) {
        let key = normalize(path);
        let rendered = prompts::file_entry(&key, content);

        let existing = self
            .entries
            .iter_mut()
            .find(|e| matches!(&e.kind, EntryKind::File { path } if *path == key));
        match existing {
            Some(entry) => entry.content = rendered,
            None => {
                self.append(Role::System, EntryKind::File { path: key }, rendered);
            }
        }
    }

    /// Content most recently recorded for `path`.
    pub fn file_content(&self, path: &str) -> Option<&str> {
        let key = normalize(path);
        self.entries.iter().rev().find_map(|e| match &e.kind {
            EntryKind::File { path } if *path == key => prompts::file_entry_body(path, &e.content),
            _ => None,
        })
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.file_content(path).is_some()
    }

    pub fn file_entries(&self) -> impl Iterator<Item = &ConversationEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.kind, EntryKind::File { .. }))
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recent plan, if any.
    pub fn latest_plan(&self) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.kind == EntryKind::Plan)
            .map(|e| e.content.as_str())
    }

    /// Every entry, in order, as wire messages.
    pub fn snapshot(&self) -> Vec<Message> {
        self.entries.iter().map(ConversationEntry::to_message).collect()
    }

    pub fn estimated_tokens(&self) -> usize {
        self.entries.iter().map(|e| e.estimated_tokens()).sum()
    }

    pub fn begin_review_cycle(&mut self) {
        self.in_review_cycle = true;
    }

    pub fn end_review_cycle(&mut self) {
        self.in_review_cycle = false;
    }

    pub fn in_review_cycle(&self) -> bool {
        self.in_review_cycle
    }

    /// Drop every user and assistant entry. System entries survive.
    pub fn clear_turns(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.role == Role::System);
        before - self.entries.len()
    }

    /// Drop what only mattered to finished requests: every review feedback
    /// entry, and operation notes recorded before the latest request.
    pub fn retire_stale_entries(&mut self) -> usize {
        let latest_request = self
            .entries
            .iter()
            .rposition(|e| e.kind == EntryKind::Request);
        let before = self.entries.len();
        let mut index = 0;
        self.entries.retain(|e| {
            let stale = match e.kind {
                EntryKind::Feedback => true,
                EntryKind::Note => latest_request.is_none_or(|latest| index < latest),
                _ => false,
            };
            index += 1;
            !stale
        });
        before - self.entries.len()
    }

    /// Drop entries appended after the first `len` entries.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }

    /// Indices trimming must keep: the last user and the last assistant entry.
    fn protected_turns(&self) -> (Option<usize>, Option<usize>) {
        let last_of = |role: Role| self.entries.iter().rposition(|e| e.role == role);
        (last_of(Role::User), last_of(Role::Assistant))
    }

    /// Index of the oldest entry trimming may remove.
    fn oldest_droppable(&self) -> Option<usize> {
        let (last_user, last_assistant) = self.protected_turns();
        self.entries.iter().enumerate().position(|(i, e)| {
            e.role != Role::System && Some(i) != last_user && Some(i) != last_assistant
        })
    }

    /// Shrink the context toward `budget_tokens`, oldest turns first.
    ///
    /// May stay over budget when only protected entries remain.
    pub fn trim(&mut self, budget_tokens: usize) -> TrimReport {
        let tokens_before = self.estimated_tokens();
        if self.in_review_cycle {
            return TrimReport {
                dropped: 0,
                tokens_before,
                tokens_after: tokens_before,
                deferred: true,
            };
        }

        let mut total = tokens_before;
        let mut dropped = 0;
        while total > budget_tokens {
            let Some(index) = self.oldest_droppable() else {
                break;
            };
            let removed = self.entries.remove(index);
            total -= removed.estimated_tokens();
            dropped += 1;
        }

        if dropped > 0 {
            tracing::info!(dropped, tokens_before, tokens_after = total, budget_tokens, "Trimmed context");
        }
        TrimReport {
            dropped,
            tokens_before,
            tokens_after: total,
            deferred: false,
        }
    }

    /// Keep at most `max_pairs` user/assistant pairs, oldest dropped first.
    pub fn trim_pairs(&mut self, max_pairs: usize) -> TrimReport {
        let tokens_before = self.estimated_tokens();
        if self.in_review_cycle {
            return TrimReport {
                dropped: 0,
                tokens_before,
                tokens_after: tokens_before,
                deferred: true,
            };
        }

        let limit = max_pairs.saturating_mul(2);
        let mut dropped = 0;
        while self.entries.iter().filter(|e| e.role != Role::System).count() > limit {
            let Some(index) = self.oldest_droppable() else {
                break;
            };
            self.entries.remove(index);
            dropped += 1;
        }

        TrimReport {
            dropped,
            tokens_before,
            tokens_after: self.estimated_tokens(),
            deferred: false,
        }
    }
}

/// Words in a request that look like workspace file references.
pub fn referenced_paths(message: &str) -> Vec<String> {
    const EXTENSIONS: &[&str] = &[
        ".css", ".html", ".js", ".py", ".json", ".md", ".txt", ".yml", ".yaml", ".ts", ".tsx",
        ".rs", ".toml",
    ];

    let mut paths: Vec<String> = Vec::new();
    for word in message.split_whitespace() {
        let candidate = word
            .trim_matches(|c: char| matches!(c, '\'' | '"' | '`' | ',' | '(' | ')' | ':' | ';'))
            .trim_end_matches(['.', '?', '!']);
        if candidate.is_empty() {
            continue;
        }
        let looks_like_file =
            candidate.contains('/') || EXTENSIONS.iter().any(|ext| candidate.ends_with(ext));
        if looks_like_file
            && infrared_security::validate_relative_path(candidate).is_ok()
            && !paths.iter().any(|p| p == candidate)
        {
            paths.push(candidate.to_string());
        }
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> ConversationContext {
        ConversationContext::new("system prompt")
    }

    #[test]
    fn append_keeps_order_and_numbers() {
        let mut ctx = seeded();
        let a = ctx.append(Role::User, EntryKind::Request, "first");
        let b = ctx.append(Role::Assistant, EntryKind::Implementation, "second");
        assert!(b > a);
        let contents: Vec<_> = ctx.snapshot().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["system prompt", "first", "second"]);
    }

    #[test]
    fn add_file_replaces_in_place() {
        let mut ctx = seeded();
        ctx.add_file("a.txt", "v1");
        ctx.append(Role::User, EntryKind::Request, "edit it");
        ctx.add_file("./a.txt", "v2");

        assert_eq!(ctx.file_entries().count(), 1);
        assert_eq!(ctx.file_content("a.txt"), Some("v2"));
        // Still before the request
        assert!(matches!(ctx.entries()[1].kind, EntryKind::File { .. }));
        assert_eq!(ctx.entries()[1].created_order, 1);
    }

    #[test]
    fn trim_never_drops_system_or_last_pair() {
        let mut ctx = seeded();
        ctx.add_file("big.txt", &"x".repeat(4000));
        for i in 0..5 {
            ctx.append(Role::User, EntryKind::Request, format!("request {i} {}", "y".repeat(400)));
            ctx.append(Role::Assistant, EntryKind::Implementation, format!("reply {i}"));
        }

        let report = ctx.trim(10);
        assert_eq!(report.dropped, 8);
        assert!(!report.deferred);
        assert!(report.tokens_after < report.tokens_before);

        let roles: Vec<_> = ctx.entries().iter().map(|e| e.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::System, Role::User, Role::Assistant]
        );
        assert!(ctx.entries()[2].content.starts_with("request 4"));
        assert_eq!(ctx.entries()[3].content, "reply 4");
    }

    #[test]
    fn trim_under_budget_is_noop() {
        let mut ctx = seeded();
        ctx.append(Role::User, EntryKind::Request, "hi");
        let report = ctx.trim(10_000);
        assert_eq!(report.dropped, 0);
        assert_eq!(report.tokens_before, report.tokens_after);
    }

    #[test]
    fn trim_deferred_during_review_cycle() {
        let mut ctx = seeded();
        for i in 0..4 {
            ctx.append(Role::User, EntryKind::Request, format!("r{i}"));
        }
        ctx.begin_review_cycle();
        let report = ctx.trim(0);
        assert!(report.deferred);
        assert_eq!(ctx.len(), 5);

        ctx.end_review_cycle();
        let report = ctx.trim(0);
        assert!(!report.deferred);
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn trim_pairs_caps_history() {
        let mut ctx = seeded();
        for i in 0..12 {
            ctx.append(Role::User, EntryKind::Request, format!("u{i}"));
            ctx.append(Role::Assistant, EntryKind::Implementation, format!("a{i}"));
        }
        ctx.append(Role::System, EntryKind::Feedback, "feedback");

        let report = ctx.trim_pairs(10);
        assert_eq!(report.dropped, 4);
        let turns: Vec<_> = ctx
            .entries()
            .iter()
            .filter(|e| e.role != Role::System)
            .map(|e| e.content.as_str())
            .collect();
        assert_eq!(turns.len(), 20);
        assert_eq!(turns[0], "u2");
        assert_eq!(ctx.entries().last().unwrap().content, "feedback");
    }

    #[test]
    fn clear_turns_keeps_system_entries() {
        let mut ctx = seeded();
        ctx.add_file("a.txt", "A");
        ctx.append(Role::User, EntryKind::Request, "u");
        ctx.append(Role::Assistant, EntryKind::Plan, "p");
        assert_eq!(ctx.clear_turns(), 2);
        assert_eq!(ctx.len(), 2);
        assert!(ctx.latest_plan().is_none());
    }

    #[test]
    fn stale_feedback_and_notes_retired() {
        let mut ctx = ConversationContext::new("p");
        for i in 0..20 {
            ctx.append(Role::User, EntryKind::Request, format!("request {i}"));
            ctx.append(Role::Assistant, EntryKind::Implementation, format!("try {i}"));
            ctx.append(Role::System, EntryKind::Feedback, "Code Review Feedback (Attempt 1):");
            ctx.append(Role::Assistant, EntryKind::Implementation, format!("fixed {i}"));
            ctx.append(Role::System, EntryKind::Note, format!("note {i}"));
        }

        ctx.retire_stale_entries();
        let report = ctx.trim(40);
        assert!(report.tokens_after <= 40, "tokens_after {}", report.tokens_after);

        assert!(ctx.entries().iter().all(|e| e.kind != EntryKind::Feedback));
        let notes: Vec<_> = ctx
            .entries()
            .iter()
            .filter(|e| e.kind == EntryKind::Note)
            .map(|e| e.content.as_str())
            .collect();
        assert_eq!(notes, vec!["note 19"]);
    }

    #[test]
    fn retire_keeps_files_and_prompts() {
        let mut ctx = seeded();
        ctx.add_file("a.txt", "A");
        ctx.append(Role::System, EntryKind::Note, "Created a.txt");
        assert_eq!(ctx.retire_stale_entries(), 1);
        assert_eq!(ctx.len(), 2);
        assert!(ctx.has_file("a.txt"));
    }

    #[test]
    fn referenced_paths_from_request() {
        let paths = referenced_paths("Fix the bug in 'src/app.py', then update README.md.");
        assert_eq!(paths, vec!["src/app.py", "README.md"]);
        assert!(referenced_paths("look at ~/secrets.txt and ../x.txt").is_empty());
        assert!(referenced_paths("just words here").is_empty());
    }
}
