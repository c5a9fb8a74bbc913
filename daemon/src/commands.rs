//! Subcommand handlers

use anyhow::{Context, Result, bail};
use extsup_engine::Supervisor;
use serde::Serialize;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

use crate::options::AddArgs;

pub async fn run(supervisor: &Supervisor) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let started = supervisor.start_all_auto().await;
    let failed: Vec<&str> = started
        .iter()
        .filter(|(_, ok)| !ok)
        .map(|(id, _)| id.as_str())
        .collect();
    info!(
        attempted = started.len(),
        failed = failed.len(),
        "Auto-start complete"
    );
    for status in supervisor.all_statuses().await {
        if failed.contains(&status.id.as_str()) {
            warn!(
                id = %status.id,
                error = status.last_error.as_deref().unwrap_or(""),
                "Extension server failed to start"
            );
        }
    }

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }

    let stopped = supervisor.stop_all().await;
    let stuck: Vec<String> = stopped
        .into_iter()
        .filter(|(_, ok)| !ok)
        .map(|(id, _)| id)
        .collect();
    if !stuck.is_empty() {
        bail!("failed to stop extension servers: {}", stuck.join(", "));
    }
    info!("All extension servers stopped");
    Ok(())
}

pub async fn list(supervisor: &Supervisor) -> Result<()> {
    print_json(&supervisor.configs().await)
}

pub async fn add(supervisor: &Supervisor, args: AddArgs) -> Result<()> {
    let config = args.into_config();
    let id = config.id.clone();
    supervisor
        .add_config(config)
        .await
        .with_context(|| format!("failed to add extension server '{id}'"))?;
    info!(%id, "Extension server configuration saved");
    Ok(())
}

pub async fn remove(supervisor: &Supervisor, id: &str) -> Result<()> {
    supervisor
        .remove_config(id)
        .await
        .with_context(|| format!("failed to remove extension server '{id}'"))?;
    info!(%id, "Extension server configuration removed");
    Ok(())
}

/// Launches one server through the normal start path and reports what an
/// operator would see, then shuts it down again.
pub async fn check(supervisor: &Supervisor, id: &str) -> Result<()> {
    let started = supervisor.start(id).await?;
    let status = supervisor.status(id).await?;
    let stopped = supervisor.stop(id).await;
    print_json(&status)?;

    if !stopped {
        bail!("extension server '{id}' did not stop");
    }
    if !started {
        bail!(
            "extension server '{id}' failed to start: {}",
            status.last_error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}
