//! `infrared run` — Serve a single request and exit.

use super::SessionOptions;
use infrared_core::event::EventBus;
use infrared_engine::CancelToken;
use std::sync::Arc;

pub async fn run(
    options: SessionOptions,
    message: String,
    add: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(&options)?;
    let event_bus = Arc::new(EventBus::default());
    let mut orch = super::build_orchestrator(&config, event_bus.clone())?;
    super::load_tech_stack(&mut orch, &config).await;

    for target in &add {
        super::add_to_context(&mut orch, target)
            .map_err(|e| format!("Could not add '{target}': {e}"))?;
    }

    let mut events = event_bus.subscribe();
    let cancel = CancelToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let report = super::run_with_progress(&mut orch, &mut events, &message, &cancel).await;
    watcher.abort();

    super::print_report(&report);
    match report.error {
        None => Ok(()),
        Some(e) => Err(e.into()),
    }
}
