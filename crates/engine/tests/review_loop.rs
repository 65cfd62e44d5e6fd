//! End-to-end tests for the plan → implement → review loop.
//!
//! These drive a real `Orchestrator` over a temporary workspace with a
//! scripted provider, from user request to files on disk.

use std::sync::{Arc, Mutex};

use infrared_core::error::ProviderError;
use infrared_core::event::{DomainEvent, EventBus};
use infrared_core::message::Role;
use infrared_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use infrared_core::{Error, Phase};
use infrared_engine::context::{ConversationContext, EntryKind};
use infrared_engine::{CancelToken, Materializer, Orchestrator, OrchestratorSettings};

// ── Mock Provider ────────────────────────────────────────────────────────

/// Returns scripted responses in sequence and records every request.
struct ScriptedProvider {
    responses: Vec<String>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(responses: &[&str]) -> Self {
        Self {
            responses: responses.iter().map(|r| r.to_string()).collect(),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn phases(&self) -> Vec<Phase> {
        self.requests.lock().unwrap().iter().map(|r| r.phase).collect()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let index = requests.len();
        requests.push(request);
        let Some(text) = self.responses.get(index) else {
            panic!(
                "ScriptedProvider exhausted: call #{index}, have {}",
                self.responses.len()
            );
        };
        Ok(ProviderResponse {
            content: text.clone(),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "mock".into(),
        })
    }
}

fn setup(
    responses: &[&str],
    settings: OrchestratorSettings,
) -> (tempfile::TempDir, Arc<ScriptedProvider>, Arc<EventBus>, Orchestrator) {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(responses));
    let bus = Arc::new(EventBus::default());
    let orch = Orchestrator::new(
        provider.clone(),
        Materializer::new(dir.path(), 5_000_000),
        settings,
        bus.clone(),
    );
    (dir, provider, bus, orch)
}

fn without_planning() -> OrchestratorSettings {
    OrchestratorSettings {
        planning: false,
        ..OrchestratorSettings::default()
    }
}

const NEED_CHANGES: &str =
    r#"{"analysis": "still wrong", "explanation": "fix it", "output": "NEED_CHANGES"}"#;
const EDIT_A: &str = r#"{"assistant_reply": "try", "files_to_edit": [{"path": "a.txt", "original_snippet": "one", "new_snippet": "two"}]}"#;

// ── Scenario: hello world ────────────────────────────────────────────────

#[tokio::test]
async fn e2e_hello_world_created() {
    let (dir, provider, bus, mut orch) = setup(
        &[
            r#"{"assistant_reply": "1. Create hello.txt containing hello"}"#,
            "```json\n{\"assistant_reply\": \"Created hello.txt\", \"files_to_create\": [{\"path\": \"hello.txt\", \"content\": \"hello\"}]}\n```",
            r#"{"analysis": "Creates the file as asked.", "explanation": "Complete.", "output": "CORRECT"}"#,
        ],
        OrchestratorSettings::default(),
    );
    let mut events = bus.subscribe();

    let report = orch
        .run("create hello.txt with content hello", &CancelToken::new())
        .await;

    assert_eq!(report.phase, Phase::Done, "error: {:?}", report.error);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("hello.txt")).unwrap(),
        "hello"
    );
    assert_eq!(report.applied.len(), 1);
    assert_eq!(report.applied[0].kind, "new_file");
    assert_eq!(
        provider.phases(),
        vec![Phase::Planning, Phase::Implementing, Phase::Reviewing]
    );

    // Context now knows the file and records the operation
    assert_eq!(orch.context().file_content("hello.txt"), Some("hello"));
    assert!(orch
        .context()
        .entries()
        .iter()
        .any(|e| e.kind == EntryKind::Note && e.content.contains("hello.txt")));

    let mut applied = 0;
    let mut finished = None;
    while let Ok(event) = events.try_recv() {
        match event.as_ref() {
            DomainEvent::ChangeApplied { path, .. } => {
                assert_eq!(path, "hello.txt");
                applied += 1;
            }
            DomainEvent::RunFinished { phase, .. } => finished = Some(*phase),
            _ => {}
        }
    }
    assert_eq!(applied, 1);
    assert_eq!(finished, Some(Phase::Done));
}

// ── Scenario: ambiguous edit ─────────────────────────────────────────────

#[tokio::test]
async fn e2e_ambiguous_edit_rejected_before_apply() {
    let (dir, provider, _bus, mut orch) = setup(
        &[r#"{"assistant_reply": "bump", "files_to_edit": [{"path": "config.py", "original_snippet": "DEBUG = True", "new_snippet": "DEBUG = False"}]}"#],
        without_planning(),
    );
    let original = "DEBUG = True\nPORT = 80\nDEBUG = True\n";
    std::fs::write(dir.path().join("config.py"), original).unwrap();

    let report = orch.run("turn off debug in config.py", &CancelToken::new()).await;

    assert_eq!(report.phase, Phase::Failed);
    match &report.error {
        Some(Error::AmbiguousEdit { path, count }) => {
            assert_eq!(path, "config.py");
            assert_eq!(*count, 2);
        }
        other => panic!("Expected AmbiguousEdit, got: {other:?}"),
    }
    assert!(!report.transitions.contains(&Phase::Applying));
    assert!(!report.transitions.contains(&Phase::Reviewing));
    assert_eq!(provider.phases(), vec![Phase::Implementing]);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("config.py")).unwrap(),
        original
    );
}

// ── Retry ceiling ────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_three_need_changes_fail_without_fourth_attempt() {
    let (dir, provider, _bus, mut orch) = setup(
        &[EDIT_A, NEED_CHANGES, EDIT_A, NEED_CHANGES, EDIT_A, NEED_CHANGES],
        without_planning(),
    );
    std::fs::write(dir.path().join("a.txt"), "one").unwrap();

    let report = orch.run("change a.txt", &CancelToken::new()).await;

    assert_eq!(report.phase, Phase::Failed);
    assert!(matches!(
        report.error,
        Some(Error::RetryCeilingExceeded { attempts: 3 })
    ));
    assert_eq!(report.attempts, 3);
    let implementations = provider
        .phases()
        .into_iter()
        .filter(|p| *p == Phase::Implementing)
        .count();
    assert_eq!(implementations, 3);
    // Nothing was applied
    assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "one");
}

#[tokio::test]
async fn e2e_retry_state_resets_per_request() {
    let (dir, _provider, _bus, mut orch) = setup(
        &[
            EDIT_A,
            NEED_CHANGES,
            EDIT_A,
            NEED_CHANGES,
            EDIT_A,
            NEED_CHANGES,
            // Second request gets a fresh budget
            EDIT_A,
            NEED_CHANGES,
            EDIT_A,
            r#"{"output": "CORRECT"}"#,
        ],
        without_planning(),
    );
    std::fs::write(dir.path().join("a.txt"), "one").unwrap();

    let first = orch.run("change a.txt", &CancelToken::new()).await;
    assert_eq!(first.phase, Phase::Failed);

    let second = orch.run("try again", &CancelToken::new()).await;
    assert_eq!(second.phase, Phase::Done, "error: {:?}", second.error);
    assert_eq!(second.attempts, 2);
    assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "two");
}

// ── Applying ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_edit_to_file_created_in_same_batch() {
    let (dir, _provider, _bus, mut orch) = setup(
        &[
            r#"{"files_to_create": [{"path": "src/lib.rs", "content": "pub fn a() {}\n"}], "files_to_edit": [{"path": "src/lib.rs", "original_snippet": "a()", "new_snippet": "b()"}]}"#,
            r#"{"output": "CORRECT"}"#,
        ],
        without_planning(),
    );

    let report = orch.run("add a lib", &CancelToken::new()).await;

    assert_eq!(report.phase, Phase::Done, "error: {:?}", report.error);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("src/lib.rs")).unwrap(),
        "pub fn b() {}\n"
    );
    let kinds: Vec<_> = report.applied.iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec!["new_file", "file_edit"]);
}

#[tokio::test]
async fn e2e_home_reference_fails_the_request() {
    let (dir, provider, _bus, mut orch) = setup(
        &[r#"{"files_to_create": [{"path": "~/.bashrc", "content": "x"}, {"path": "ok.txt", "content": "y"}]}"#],
        without_planning(),
    );

    let report = orch.run("configure my shell", &CancelToken::new()).await;

    assert!(matches!(
        report.error,
        Some(Error::PathSecurityViolation { .. })
    ));
    // The valid sibling op was not applied either
    assert!(!dir.path().join("ok.txt").exists());
    assert_eq!(provider.phases(), vec![Phase::Implementing]);
}

#[tokio::test]
async fn e2e_oversized_content_rejected() {
    let big = "a".repeat(5_000_001);
    let response = serde_json::json!({
        "files_to_create": [{"path": "big.txt", "content": big}]
    })
    .to_string();
    let (dir, _provider, _bus, mut orch) = setup(&[response.as_str()], without_planning());

    let report = orch.run("make a big file", &CancelToken::new()).await;

    assert!(matches!(
        report.error,
        Some(Error::PathSecurityViolation { .. })
    ));
    assert!(!dir.path().join("big.txt").exists());
}

#[tokio::test]
async fn e2e_mid_batch_failure_keeps_earlier_writes() {
    let (dir, _provider, _bus, mut orch) = setup(
        &[
            r#"{"files_to_create": [{"path": "ok.txt", "content": "y"}, {"path": "blocker/x.txt", "content": "z"}]}"#,
            r#"{"output": "CORRECT"}"#,
        ],
        without_planning(),
    );
    // A plain file where the second op needs a directory
    std::fs::write(dir.path().join("blocker"), "in the way").unwrap();

    let report = orch.run("add two files", &CancelToken::new()).await;

    assert_eq!(report.phase, Phase::Failed);
    assert!(matches!(report.error, Some(Error::Io { .. })), "got: {:?}", report.error);
    assert_eq!(
        report.transitions,
        vec![Phase::Implementing, Phase::Reviewing, Phase::Applying, Phase::Failed]
    );
    // No rollback: the first op stays on disk
    assert_eq!(std::fs::read_to_string(dir.path().join("ok.txt")).unwrap(), "y");
    assert_eq!(report.applied.len(), 1);
    assert_eq!(orch.context().file_content("ok.txt"), Some("y"));
}

#[tokio::test]
async fn e2e_missing_snippet_leaves_file_unchanged() {
    let (dir, provider, _bus, mut orch) = setup(
        &[r#"{"files_to_edit": [{"path": "a.txt", "original_snippet": "zzz", "new_snippet": "two"}]}"#],
        without_planning(),
    );
    std::fs::write(dir.path().join("a.txt"), "one").unwrap();

    let report = orch.run("change a.txt", &CancelToken::new()).await;

    assert_eq!(report.phase, Phase::Failed);
    match &report.error {
        Some(Error::SnippetNotFound { path }) => assert_eq!(path, "a.txt"),
        other => panic!("Expected SnippetNotFound, got: {other:?}"),
    }
    assert!(!report.transitions.contains(&Phase::Applying));
    assert_eq!(provider.phases(), vec![Phase::Implementing]);
    assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "one");
}

// ── Context ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_feedback_does_not_reach_later_requests() {
    const CREATE_A: &str =
        r#"{"assistant_reply": "try", "files_to_create": [{"path": "a.txt", "content": "v"}]}"#;
    const CORRECT: &str = r#"{"output": "CORRECT"}"#;
    let mut script = Vec::new();
    for _ in 0..20 {
        script.extend([CREATE_A, NEED_CHANGES, CREATE_A, CORRECT]);
    }
    let settings = OrchestratorSettings {
        planning: false,
        context_budget_tokens: 50,
        ..OrchestratorSettings::default()
    };
    let (_dir, provider, _bus, mut orch) = setup(&script, settings);

    let mut after_second = None;
    for i in 0..20 {
        let report = orch
            .run(&format!("recreate a.txt, round {i:02}"), &CancelToken::new())
            .await;
        assert_eq!(report.phase, Phase::Done, "round {i}: {:?}", report.error);
        if i == 1 {
            after_second = Some((orch.context().len(), orch.context().estimated_tokens()));
        }
    }

    // Growth stops once the loop reaches a steady state
    let after_last = (orch.context().len(), orch.context().estimated_tokens());
    assert_eq!(Some(after_last), after_second);

    let feedback_in = |request: &ProviderRequest| {
        request
            .messages
            .iter()
            .filter(|m| m.content.starts_with("Code Review Feedback"))
            .count()
    };
    let requests = provider.requests.lock().unwrap();
    assert_eq!(requests.len(), 80);
    // Last request: first attempt sees no old feedback, the retry sees its own
    assert_eq!(requests[76].phase, Phase::Implementing);
    assert_eq!(feedback_in(&requests[76]), 0);
    assert_eq!(requests[78].phase, Phase::Implementing);
    assert_eq!(feedback_in(&requests[78]), 1);
}

#[tokio::test]
async fn e2e_added_file_replaced_after_edit() {
    let (dir, _provider, _bus, mut orch) = setup(&[EDIT_A, r#"{"output": "CORRECT"}"#], without_planning());
    std::fs::write(dir.path().join("a.txt"), "one").unwrap();
    orch.add_file("a.txt", "one");

    let report = orch.run("change it", &CancelToken::new()).await;
    assert_eq!(report.phase, Phase::Done, "error: {:?}", report.error);

    let files: Vec<_> = orch.context().file_entries().collect();
    assert_eq!(files.len(), 1);
    assert_eq!(orch.context().file_content("a.txt"), Some("two"));
}

#[test]
fn trim_preserves_system_entries_and_last_exchange() {
    let mut ctx = ConversationContext::new("prompt");
    ctx.add_file("a.txt", &"a".repeat(2000));
    for i in 0..20 {
        ctx.append(Role::User, EntryKind::Request, format!("request {i}"));
        ctx.append(Role::Assistant, EntryKind::Implementation, format!("reply {i}"));
        ctx.append(Role::System, EntryKind::Note, format!("note {i}"));
    }

    for budget in [0, 50, 500, 5_000] {
        let mut trimmed = ctx.clone();
        trimmed.trim(budget);

        let systems_before = ctx.entries().iter().filter(|e| e.role == Role::System).count();
        let systems_after = trimmed
            .entries()
            .iter()
            .filter(|e| e.role == Role::System)
            .count();
        assert_eq!(systems_before, systems_after, "budget {budget}");

        let last_user = trimmed.entries().iter().rev().find(|e| e.role == Role::User);
        let last_assistant = trimmed
            .entries()
            .iter()
            .rev()
            .find(|e| e.role == Role::Assistant);
        assert_eq!(last_user.map(|e| e.content.as_str()), Some("request 19"));
        assert_eq!(last_assistant.map(|e| e.content.as_str()), Some("reply 19"));

        // Survivors keep their relative order
        let orders: Vec<_> = trimmed.entries().iter().map(|e| e.created_order).collect();
        assert!(orders.windows(2).all(|w| w[0] < w[1]));
    }
}
