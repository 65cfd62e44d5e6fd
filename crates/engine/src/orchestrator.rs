//! Orchestrator — drives one request through Plan → Implement → Review → Apply.
//!
//! ```text
//! PLANNING → IMPLEMENTING → REVIEWING ─┬─ CORRECT ──────► APPLYING → DONE
//!                 ▲                    ├─ NEED_CHANGES ─┐
//!                 └────────────────────┘                │ (attempts < max)
//!                                      └─ INCORRECT / UNNECESSARY / ceiling → FAILED
//! ```
//!
//! The orchestrator owns the session's [`ConversationContext`] and the
//! per-request [`RetryState`]. Only `APPLYING` writes to disk, and only after
//! the whole batch passed a dry run and a `CORRECT` review.

use crate::context::{ConversationContext, EntryKind, TrimReport, referenced_paths};
use crate::materializer::Materializer;
use crate::overlay::{Overlay, ValidationIssue};
use crate::parse;
use crate::prompts;
use crate::snippet;
use chrono::Utc;
use infrared_config::AppConfig;
use infrared_core::message::{Message, Role};
use infrared_core::{
    AssistantResponse, DomainEvent, Error, EventBus, FileOp, Phase, Provider, ProviderRequest,
    Result, SessionId, Verdict,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Knobs for the review loop, usually taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub model: String,
    pub planning_model: Option<String>,
    pub review_model: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub max_attempts: u32,
    pub planning: bool,
    pub repair_invalid_edits: bool,
    pub context_budget_tokens: usize,
    pub max_history_pairs: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for OrchestratorSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            model: config.model.clone(),
            planning_model: config.orchestrator.planning_model.clone(),
            review_model: config.orchestrator.review_model.clone(),
            temperature: config.temperature,
            max_tokens: Some(config.max_tokens),
            max_attempts: config.orchestrator.max_attempts.max(1),
            planning: config.orchestrator.planning,
            repair_invalid_edits: config.orchestrator.repair_invalid_edits,
            context_budget_tokens: config.limits.context_budget_tokens,
            max_history_pairs: config.limits.max_history_pairs,
        }
    }
}

/// Cooperative cancellation, checked between phases.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Review-loop bookkeeping for the request in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    pub attempt_count: u32,
    pub last_feedback: Option<String>,
}

/// One file operation that reached disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedChange {
    pub path: String,
    pub kind: &'static str,
}

/// The reviewer's final word on a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewOutcome {
    pub verdict: Verdict,
    pub analysis: Option<String>,
    pub explanation: Option<String>,
    /// Produced by dry-run validation rather than the model
    pub synthetic: bool,
}

/// Result of one top-level request.
#[derive(Debug)]
pub struct RunReport {
    /// `Done` or `Failed`
    pub phase: Phase,
    /// Implementation attempts issued
    pub attempts: u32,
    pub transitions: Vec<Phase>,
    pub plan: Option<String>,
    pub reply: Option<String>,
    pub applied: Vec<AppliedChange>,
    pub review: Option<ReviewOutcome>,
    pub error: Option<Error>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            phase: Phase::Planning,
            attempts: 0,
            transitions: Vec::new(),
            plan: None,
            reply: None,
            applied: Vec::new(),
            review: None,
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.phase == Phase::Done
    }
}

pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    materializer: Materializer,
    context: ConversationContext,
    settings: OrchestratorSettings,
    event_bus: Arc<EventBus>,
    session_id: SessionId,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        materializer: Materializer,
        settings: OrchestratorSettings,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            materializer,
            context: ConversationContext::new(prompts::IMPLEMENTATION_PROMPT),
            settings,
            event_bus,
            session_id: SessionId::new(),
        }
    }

    pub fn from_config(
        provider: Arc<dyn Provider>,
        config: &AppConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self::new(
            provider,
            Materializer::from_config(config),
            OrchestratorSettings::from(config),
            event_bus,
        )
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub fn materializer(&self) -> &Materializer {
        &self.materializer
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Put a file's content into context (the `/add` path).
    pub fn add_file(&mut self, path: &str, content: &str) {
        self.context.add_file(path, content);
    }

    /// Forget user and assistant turns; files and prompts stay.
    pub fn clear_history(&mut self) -> usize {
        self.context.clear_turns()
    }

    /// Serve one top-level request until it reaches `Done` or `Failed`.
    ///
    /// Errors are reported in the returned [`RunReport`], never panicked; the
    /// context is left appendable for the next request either way.
    pub async fn run(&mut self, request: &str, cancel: &CancelToken) -> RunReport {
        let mut report = RunReport::new();
        self.context.end_review_cycle();
        let retired = self.context.retire_stale_entries();
        if retired > 0 {
            debug!(retired, "Retired feedback and notes from earlier requests");
        }
        let trimmed = self.trim_context();
        if trimmed.dropped > 0 {
            info!(
                dropped = trimmed.dropped,
                tokens_before = trimmed.tokens_before,
                tokens_after = trimmed.tokens_after,
                "Trimmed conversation context"
            );
        }
        self.load_referenced_files(request).await;

        let checkpoint = self.context.len();
        self.context.append(Role::User, EntryKind::Request, request);

        if let Err(error) = self.drive(&mut report, cancel).await {
            if matches!(error, Error::Transport(_)) {
                // A failed call leaves no trace of this request
                self.context.truncate(checkpoint);
            }
            self.fail(&mut report, error);
        }
        self.context.end_review_cycle();

        self.event_bus.publish(DomainEvent::RunFinished {
            phase: report.phase,
            attempts: report.attempts,
            error_message: report.error.as_ref().map(|e| e.to_string()),
            timestamp: Utc::now(),
        });
        report
    }

    async fn drive(&mut self, report: &mut RunReport, cancel: &CancelToken) -> Result<()> {
        let mut retry = RetryState::default();

        if self.settings.planning {
            check_cancel(cancel)?;
            self.enter(report, Phase::Planning, 0);
            let messages = self.planning_messages();
            let model = self.planning_model();
            let plan = match self.call(Phase::Planning, model, messages).await? {
                AssistantResponse::Plan { reply_text } => reply_text,
                other => return Err(unexpected(Phase::Planning, &other)),
            };
            self.context
                .append(Role::Assistant, EntryKind::Plan, plan.clone());
            report.plan = Some(plan);
        }

        loop {
            check_cancel(cancel)?;
            let attempt = retry.attempt_count + 1;
            self.enter(report, Phase::Implementing, attempt);
            report.attempts = attempt;

            let messages = self.implementation_messages();
            let model = self.settings.model.clone();
            let response = self.call(Phase::Implementing, model, messages).await?;
            let AssistantResponse::Implementation {
                reply_text,
                creates,
                edits,
            } = &response
            else {
                return Err(unexpected(Phase::Implementing, &response));
            };
            let ops = response.operations();
            let recorded = if reply_text.trim().is_empty() {
                format!(
                    "Proposed {} new file(s) and {} edit(s).",
                    creates.len(),
                    edits.len()
                )
            } else {
                reply_text.clone()
            };
            self.context
                .append(Role::Assistant, EntryKind::Implementation, recorded);
            report.reply = Some(reply_text.clone());
            self.context.begin_review_cycle();

            let mut issues = Overlay::new(&self.materializer).check_all(&ops).await;
            let review = if issues.is_empty() {
                check_cancel(cancel)?;
                self.enter(report, Phase::Reviewing, attempt);
                self.review(&ops).await?
            } else if self.settings.repair_invalid_edits {
                warn!(attempt, issues = issues.len(), "Batch failed dry run, requesting changes");
                synthetic_review(&issues)
            } else {
                warn!(attempt, issues = issues.len(), "Batch failed dry run");
                return Err(issues.remove(0).error);
            };

            self.event_bus.publish(DomainEvent::ReviewCompleted {
                verdict: review.verdict,
                attempt,
                explanation: review.explanation.clone(),
                timestamp: Utc::now(),
            });
            info!(verdict = %review.verdict, attempt, synthetic = review.synthetic, "Review completed");
            report.review = Some(review.clone());

            match review.verdict {
                Verdict::Correct => {
                    self.context.end_review_cycle();
                    check_cancel(cancel)?;
                    self.enter(report, Phase::Applying, attempt);
                    self.apply(&ops, report).await?;
                    self.enter(report, Phase::Done, attempt);
                    return Ok(());
                }
                Verdict::NeedChanges => {
                    retry.attempt_count += 1;
                    if retry.attempt_count >= self.settings.max_attempts {
                        return Err(Error::RetryCeilingExceeded {
                            attempts: retry.attempt_count,
                        });
                    }
                    let text = prompts::feedback(
                        retry.attempt_count,
                        review.analysis.as_deref(),
                        review.explanation.as_deref(),
                    );
                    self.context
                        .append(Role::System, EntryKind::Feedback, text.clone());
                    retry.last_feedback = Some(text);
                    debug!(attempt = retry.attempt_count, "Retrying implementation with feedback");
                }
                verdict @ (Verdict::Incorrect | Verdict::Unnecessary) => {
                    return Err(Error::ReviewRejected {
                        verdict,
                        explanation: review
                            .explanation
                            .or(review.analysis)
                            .unwrap_or_else(|| "no explanation given".into()),
                    });
                }
            }
        }
    }

    async fn review(&self, ops: &[FileOp]) -> Result<ReviewOutcome> {
        let files: Vec<&str> = self
            .context
            .file_entries()
            .map(|e| e.content.as_str())
            .collect();
        let plan = self.context.latest_plan();
        let messages = vec![
            Message::system(prompts::REVIEW_PROMPT),
            Message::user(prompts::review_request(&files, plan, ops)?),
        ];
        let model = self.review_model();

        match self.call(Phase::Reviewing, model, messages).await? {
            AssistantResponse::Review {
                verdict,
                analysis,
                explanation,
            } => Ok(ReviewOutcome {
                verdict,
                analysis,
                explanation,
                synthetic: false,
            }),
            other => Err(unexpected(Phase::Reviewing, &other)),
        }
    }

    /// Apply a reviewed batch in order. Stops at the first failure; ops that
    /// already landed stay on disk.
    async fn apply(&mut self, ops: &[FileOp], report: &mut RunReport) -> Result<()> {
        for op in ops {
            let content = match op {
                FileOp::Create(create) => create.content.clone(),
                FileOp::Edit(edit) => {
                    snippet::apply(
                        &self.materializer,
                        &edit.path,
                        &edit.original_snippet,
                        &edit.new_snippet,
                    )
                    .await?
                }
            };
            self.materializer.write(op.path(), &content).await?;

            self.context.add_file(op.path(), &content);
            self.context
                .append(Role::System, EntryKind::Note, prompts::operation_note(op));
            report.applied.push(AppliedChange {
                path: op.path().to_string(),
                kind: op.kind(),
            });
            self.event_bus.publish(DomainEvent::ChangeApplied {
                path: op.path().to_string(),
                kind: op.kind().to_string(),
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    /// One model call, parsed for `phase`.
    async fn call(
        &self,
        phase: Phase,
        model: String,
        messages: Vec<Message>,
    ) -> Result<AssistantResponse> {
        let request = ProviderRequest {
            model: model.clone(),
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            phase,
        };
        debug!(
            %phase,
            model = %model,
            messages = request.messages.len(),
            "Calling model"
        );

        let started = Instant::now();
        let response = self.provider.complete(request).await?;
        let duration_ms = started.elapsed().as_millis() as u64;

        self.event_bus.publish(DomainEvent::ModelCalled {
            phase,
            model,
            tokens_used: response.usage.as_ref().map(|u| u.total_tokens),
            duration_ms,
            timestamp: Utc::now(),
        });

        parse::parse(&response.content, phase).inspect_err(|e| {
            warn!(%phase, error = %e, "Discarding malformed response");
        })
    }

    fn planning_messages(&self) -> Vec<Message> {
        let mut messages = vec![Message::system(prompts::PLANNING_PROMPT)];
        messages.extend(self.context.file_entries().map(|e| e.to_message()));
        if let Some(request) = self
            .context
            .entries()
            .iter()
            .rev()
            .find(|e| e.kind == EntryKind::Request)
        {
            messages.push(request.to_message());
        }
        messages
    }

    fn implementation_messages(&self) -> Vec<Message> {
        let mut messages = self.context.snapshot();
        if messages.last().is_some_and(|m| m.role != Role::User) {
            messages.push(Message::user(prompts::IMPLEMENTATION_NUDGE));
        }
        messages
    }

    fn planning_model(&self) -> String {
        self.settings
            .planning_model
            .clone()
            .unwrap_or_else(|| self.settings.model.clone())
    }

    fn review_model(&self) -> String {
        self.settings
            .review_model
            .clone()
            .unwrap_or_else(|| self.settings.model.clone())
    }

    fn trim_context(&mut self) -> TrimReport {
        let pairs = self.context.trim_pairs(self.settings.max_history_pairs);
        let budget = self.context.trim(self.settings.context_budget_tokens);
        TrimReport {
            dropped: pairs.dropped + budget.dropped,
            tokens_before: pairs.tokens_before,
            tokens_after: budget.tokens_after,
            deferred: pairs.deferred || budget.deferred,
        }
    }

    /// Pull files named in the request into context if they exist and fit.
    async fn load_referenced_files(&mut self, request: &str) {
        for path in referenced_paths(request) {
            if self.context.has_file(&path) {
                continue;
            }
            match self.materializer.read(&path).await {
                Ok(content) if content.len() <= self.materializer.max_file_bytes() => {
                    debug!(path = %path, "Loaded referenced file into context");
                    self.context.add_file(&path, &content);
                }
                Ok(_) => debug!(path = %path, "Referenced file exceeds size ceiling"),
                Err(e) => debug!(path = %path, error = %e, "Referenced file not loaded"),
            }
        }
    }

    fn enter(&self, report: &mut RunReport, phase: Phase, attempt: u32) {
        info!(session = %self.session_id, %phase, attempt, "Entering phase");
        report.phase = phase;
        report.transitions.push(phase);
        self.event_bus.publish(DomainEvent::PhaseEntered {
            phase,
            attempt,
            timestamp: Utc::now(),
        });
    }

    fn fail(&self, report: &mut RunReport, error: Error) {
        warn!(session = %self.session_id, error = %error, "Request failed");
        let attempt = report.attempts;
        self.enter(report, Phase::Failed, attempt);
        report.error = Some(error);
    }
}

fn check_cancel(cancel: &CancelToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

fn unexpected(phase: Phase, response: &AssistantResponse) -> Error {
    Error::MalformedResponse {
        phase,
        detail: format!("expected a different shape, got {}", response.variant_name()),
    }
}

/// `NEED_CHANGES` built from dry-run failures instead of a model review.
fn synthetic_review(issues: &[ValidationIssue]) -> ReviewOutcome {
    let lines: Vec<String> = issues
        .iter()
        .map(|issue| format!("- {}", issue.error))
        .collect();
    ReviewOutcome {
        verdict: Verdict::NeedChanges,
        analysis: Some(format!("Invalid edits detected:\n{}", lines.join("\n"))),
        explanation: Some(
            "Edits cannot be applied due to missing, ambiguous, or unsafe targets.".into(),
        ),
        synthetic: true,
    }
}
