//! CLI subcommands and the session plumbing they share.

pub mod chat;
pub mod config_cmd;
pub mod ingest;
pub mod run;

use infrared_config::AppConfig;
use infrared_core::event::{DomainEvent, EventBus};
use infrared_core::{Error, Phase};
use infrared_engine::{CancelToken, Orchestrator, RunReport};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Global flags that shape a session.
pub struct SessionOptions {
    pub config_path: Option<PathBuf>,
    pub workspace: Option<PathBuf>,
}

/// Load configuration honoring `--config` and `--workspace`.
pub fn load_config(options: &SessionOptions) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let mut config = match &options.config_path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)?;
            config.apply_env_overrides(|key| std::env::var(key).ok());
            config.validate()?;
            config
        }
        None => AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?,
    };
    if let Some(workspace) = &options.workspace {
        config.session.workspace_root = workspace.clone();
    }
    Ok(config)
}

/// Build an orchestrator over the configured provider and workspace.
pub fn build_orchestrator(
    config: &AppConfig,
    event_bus: Arc<EventBus>,
) -> Result<Orchestrator, Box<dyn std::error::Error>> {
    if !config.has_api_key() && config.provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    INFRARED_API_KEY=sk-...   (highest priority)");
        eprintln!("    DEEPSEEK_API_KEY=sk-...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let provider = infrared_providers::build_from_config(config)?;
    Ok(Orchestrator::from_config(provider, config, event_bus))
}

/// Load the optional technical stack document into context.
pub async fn load_tech_stack(orch: &mut Orchestrator, config: &AppConfig) {
    let Some(path) = &config.session.tech_stack_file else {
        return;
    };
    let name = path.to_string_lossy().replace('\\', "/");
    match orch.materializer().read(&name).await {
        Ok(content) => {
            orch.add_file(&name, &content);
            println!("  ✓ Loaded technical stack documentation from '{name}'");
        }
        Err(Error::NotFound { .. }) => {
            println!("  ⚠ '{name}' not found. Technical guidelines unavailable.");
        }
        Err(e) => println!("  ✗ Error loading technical stack: {e}"),
    }
}

/// `/add` a file or folder to the conversation, reporting each file.
pub fn add_to_context(orch: &mut Orchestrator, target: &str) -> Result<usize, std::io::Error> {
    let root = orch.materializer().root().to_path_buf();
    let limit = orch.materializer().max_file_bytes();
    let report = ingest::ingest(&root, target, limit)?;

    for file in &report.added {
        orch.add_file(&file.path, &file.content);
        println!("  ✓ Added '{}' to the conversation", file.path);
    }
    for (path, reason) in &report.skipped {
        println!("  ⚠ Skipped '{path}': {reason}");
    }
    Ok(report.added.len())
}

/// Run one request, printing its events while it runs. Every event the run
/// published is printed before this returns.
pub async fn run_with_progress(
    orch: &mut Orchestrator,
    events: &mut Receiver<Arc<DomainEvent>>,
    request: &str,
    cancel: &CancelToken,
) -> RunReport {
    let run = orch.run(request, cancel);
    tokio::pin!(run);
    let mut open = true;

    let report = loop {
        tokio::select! {
            report = &mut run => break report,
            event = events.recv(), if open => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Progress output fell behind");
                }
                Err(RecvError::Closed) => open = false,
            },
        }
    };

    drain_pending(events, print_event);
    report
}

/// Hand every already-queued event to `on_event`. Returns how many there were.
fn drain_pending(
    events: &mut Receiver<Arc<DomainEvent>>,
    mut on_event: impl FnMut(&DomainEvent),
) -> usize {
    let mut drained = 0;
    loop {
        match events.try_recv() {
            Ok(event) => {
                on_event(event.as_ref());
                drained += 1;
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => return drained,
        }
    }
}

fn print_event(event: &DomainEvent) {
    match event {
        DomainEvent::PhaseEntered { phase, attempt, .. } => match phase {
            Phase::Planning => println!("\n  ▸ Phase 1: Generating implementation plan"),
            Phase::Implementing => println!("\n  ▸ Implementation attempt {attempt}"),
            Phase::Reviewing => println!("  ▸ Reviewing proposed changes"),
            Phase::Applying => println!("  ▸ Applying changes"),
            Phase::Done | Phase::Failed => {}
        },
        DomainEvent::ModelCalled {
            phase,
            model,
            tokens_used,
            duration_ms,
            ..
        } => {
            let tokens = tokens_used
                .map(|t| format!(", {t} tokens"))
                .unwrap_or_default();
            println!("    {phase}: {model} answered in {duration_ms} ms{tokens}");
        }
        DomainEvent::ReviewCompleted {
            verdict,
            explanation,
            ..
        } => {
            println!("    Review: {verdict}");
            if let Some(explanation) = explanation {
                println!("    {explanation}");
            }
        }
        DomainEvent::ChangeApplied { path, kind, .. } => {
            let action = if kind == "new_file" {
                "Created/updated"
            } else {
                "Applied edit to"
            };
            println!("  ✓ {action} '{path}'");
        }
        DomainEvent::RunFinished { .. } => {}
    }
}

/// Summarize a finished request for the terminal.
pub fn print_report(report: &RunReport) {
    if let Some(plan) = &report.plan {
        println!("\n  ── Implementation Plan ──");
        for line in plan.lines() {
            println!("  {line}");
        }
    }
    if let Some(reply) = report.reply.as_deref().filter(|r| !r.trim().is_empty()) {
        println!("\n  Assistant > {}", reply.replace('\n', "\n              "));
    }

    println!();
    match &report.error {
        None if report.applied.is_empty() => {
            println!("  ✓ Done after {} attempt(s), no file changes", report.attempts)
        }
        None => println!(
            "  ✓ Changes applied after {} attempt(s): {} file operation(s)",
            report.attempts,
            report.applied.len()
        ),
        Some(e) => {
            println!("  ✗ Final rejection after {} attempt(s): {e}", report.attempts);
            if let Some(review) = &report.review {
                println!(
                    "    FINAL ANALYSIS: {}",
                    review.analysis.as_deref().unwrap_or("No analysis provided")
                );
                println!(
                    "    EXPLANATION: {}",
                    review.explanation.as_deref().unwrap_or("No explanation provided")
                );
            }
        }
    }
    println!();
}
