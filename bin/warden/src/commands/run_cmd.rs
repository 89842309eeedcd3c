use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use warden_core::{EngineConfig, HostEvent, Paths};
use warden_engine::GovernanceEngine;

use crate::host::StdioHost;

/// Run the engine as a stdio daemon: JSON-line host events in, JSON-line
/// host commands out, until stdin closes or an interrupt arrives.
pub async fn run(config: Option<PathBuf>, state: Option<PathBuf>) -> anyhow::Result<()> {
    let paths = Paths::default();
    let config_path = config.unwrap_or_else(|| paths.config_file());
    let config = EngineConfig::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let store = Arc::new(super::open_store(state));
    let host = Arc::new(StdioHost::new());

    let mut engine = GovernanceEngine::new(config, host.clone(), store);
    engine
        .load_state()
        .await
        .context("restoring persisted state")?;

    let (event_tx, event_rx) = mpsc::channel(256);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<HostEvent>(line) {
                Ok(event) => {
                    host.observe(&event).await;
                    if event_tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "Ignoring malformed host event"),
            }
        }
        info!("Host input closed");
        // Dropping event_tx lets the engine loop drain and exit.
    });

    let mut engine_task = tokio::spawn(engine.run(event_rx, shutdown_rx));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
            let _ = shutdown_tx.send(());
            engine_task.await.context("engine task panicked")?;
        }
        result = &mut engine_task => {
            result.context("engine task panicked")?;
        }
    }

    reader.abort();
    Ok(())
}
