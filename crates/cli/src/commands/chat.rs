//! `infrared chat` — Interactive session.

use super::SessionOptions;
use infrared_core::event::{DomainEvent, EventBus};
use infrared_engine::{CancelToken, Orchestrator};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::Receiver;

/// What the session loop should do with one line of input.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Exit,
    Add(&'a str),
    AddUsage,
    Context,
    Clear,
    Request(&'a str),
}

fn classify(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    match line.to_lowercase().as_str() {
        "exit" | "quit" => return Input::Exit,
        "/context" => return Input::Context,
        "/clear" => return Input::Clear,
        "/add" => return Input::AddUsage,
        _ => {}
    }
    if let Some(rest) = line.strip_prefix("/add ") {
        let target = rest.trim();
        if target.is_empty() {
            return Input::AddUsage;
        }
        return Input::Add(target);
    }
    Input::Request(line)
}

pub async fn run(options: SessionOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(&options)?;

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║            Initializing Infrared              ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Provider:   {}", config.provider);
    println!("  Model:      {}", config.model);
    println!("  Workspace:  {}", config.session.workspace_root.display());
    println!("  Attempts:   {}", config.orchestrator.max_attempts);
    println!();

    let event_bus = Arc::new(EventBus::default());
    let mut orch = super::build_orchestrator(&config, event_bus.clone())?;
    super::load_tech_stack(&mut orch, &config).await;
    let mut events = event_bus.subscribe();

    println!();
    println!("  To include a file or folder in the conversation:");
    println!("    /add path/to/file_or_folder");
    println!("  Other commands: /context, /clear. Type 'exit' or 'quit' to leave.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match classify(&line) {
            Input::Empty => continue,
            Input::Exit => break,
            Input::AddUsage => println!("  Usage: /add path/to/file_or_folder"),
            Input::Add(target) => {
                if let Err(e) = super::add_to_context(&mut orch, target) {
                    eprintln!("  ✗ Could not add '{target}': {e}");
                }
            }
            Input::Context => print_context(&orch),
            Input::Clear => {
                let removed = orch.clear_history();
                println!("  Cleared {removed} conversation turn(s); files kept.");
            }
            Input::Request(request) => serve(&mut orch, &mut events, request).await,
        }
    }

    println!();
    println!("  Goodbye! 👋");
    println!();
    Ok(())
}

/// Run one request; Ctrl+C cancels it at the next phase boundary.
async fn serve(
    orch: &mut Orchestrator,
    events: &mut Receiver<Arc<DomainEvent>>,
    request: &str,
) {
    let cancel = CancelToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n  Cancelling after the current step...");
                cancel.cancel();
            }
        })
    };

    let report = super::run_with_progress(orch, events, request, &cancel).await;
    watcher.abort();
    super::print_report(&report);
}

fn print_context(orch: &Orchestrator) {
    let context = orch.context();
    let files: Vec<_> = context
        .file_entries()
        .filter_map(|e| match &e.kind {
            infrared_engine::EntryKind::File { path } => Some(path.as_str()),
            _ => None,
        })
        .collect();
    println!(
        "  {} entries, ~{} tokens",
        context.len(),
        context.estimated_tokens()
    );
    if files.is_empty() {
        println!("  No files in context.");
    } else {
        println!("  Files:");
        for path in files {
            println!("    {path}");
        }
    }
}
