//! Upload driver: wires the HTTP backend, the task and Ctrl-C together.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use shardlift_protocol::TaskState;
use shardlift_uploader::{HttpBackend, UploadEvent, UploadTask};
use tokio::sync::mpsc;

use crate::config::Config;

/// Uploads `file` and returns once the task stops.
///
/// Ctrl-C cancels the task, which also tears down the remote session.
pub async fn upload(file: PathBuf, config: Config) -> anyhow::Result<()> {
    let backend = HttpBackend::new(&config.server.base_url, config.server.token.as_deref())?
        .with_request_timeout(config.server.request_timeout());
    let task = Arc::new(UploadTask::new(Arc::new(backend), config.engine.clone()));

    let events = task.take_events().context("event stream already taken")?;
    let logger = tokio::spawn(log_events(events));

    task.select_file(&file)
        .await
        .with_context(|| format!("cannot upload {}", file.display()))?;

    let mut runner = {
        let task = Arc::clone(&task);
        tokio::spawn(async move { task.start().await })
    };

    let state = tokio::select! {
        result = &mut runner => result??,
        _ = tokio::signal::ctrl_c() => {
            let state = task.state();
            if state.is_terminal() {
                tracing::info!(%state, "SIGINT received after the upload stopped");
            } else {
                tracing::info!("SIGINT received, cancelling upload");
                if let Err(e) = task.cancel().await {
                    tracing::warn!(error = %e, "cancel not possible, waiting for the upload to stop");
                }
            }
            runner.await??
        }
    };

    let snapshot = task.snapshot();
    drop(task);
    let _ = logger.await;

    if state != TaskState::Completed {
        anyhow::bail!("upload stopped while {state}");
    }
    tracing::info!(
        url = snapshot.url.as_deref().unwrap_or("-"),
        bytes = snapshot.total_bytes,
        average = %format_rate(snapshot.speed.average),
        "upload finished"
    );
    Ok(())
}

/// Logs engine events until the task is dropped.
async fn log_events(mut events: mpsc::Receiver<UploadEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            UploadEvent::StateChanged { state } => {
                tracing::info!(%state, "state changed");
            }
            UploadEvent::HashProgress { percent, .. } => {
                tracing::debug!(percent, "hashing");
            }
            UploadEvent::ChunkProgress { index, percent } => {
                tracing::trace!(chunk = index, percent, "chunk progress");
            }
            UploadEvent::ChunkUploaded { index, throughput } => {
                tracing::info!(
                    chunk = index,
                    throughput = %throughput.map(format_rate).unwrap_or_else(|| "-".into()),
                    "chunk uploaded"
                );
            }
            UploadEvent::ChunkRetry {
                index,
                attempt,
                error,
            } => {
                tracing::warn!(chunk = index, attempt, %error, "chunk retry");
            }
            UploadEvent::Speed(speed) => {
                let eta = speed
                    .eta
                    .map(|d| format!("{}s", d.as_secs()))
                    .unwrap_or_else(|| "unknown".into());
                tracing::info!(
                    current = %format_rate(speed.current),
                    average = %format_rate(speed.average),
                    %eta,
                    "transfer speed"
                );
            }
            UploadEvent::Completed { url, instant } => {
                tracing::info!(url = url.as_deref().unwrap_or("-"), instant, "completed");
            }
            UploadEvent::Failed { error } => {
                tracing::error!(%error, "upload failed");
            }
        }
    }
}

fn format_rate(bytes_per_sec: f64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;
    if bytes_per_sec >= MIB {
        format!("{:.2} MiB/s", bytes_per_sec / MIB)
    } else if bytes_per_sec >= KIB {
        format!("{:.1} KiB/s", bytes_per_sec / KIB)
    } else {
        format!("{:.0} B/s", bytes_per_sec)
    }
}
