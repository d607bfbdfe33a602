// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Waypoint daemon (wpd)
//!
//! Owns one project's instance store, runs its workflows and serves the
//! socket protocol. Usage: `wpd [PROJECT_ROOT]`.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use wp_daemon::lifecycle::{self, Config, DaemonState, LifecycleError};
use wp_daemon::server;

/// Prefix of the line appended to the log before tracing starts.
/// Clients look for it to find where the current daemon's output begins.
const STARTUP_MARKER_PREFIX: &str = "--- wpd: starting (pid: ";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let project_root = match std::env::args_os().nth(1) {
        Some(arg) => PathBuf::from(arg),
        None => std::env::current_dir()?,
    };
    let config = Config::for_project(&project_root)?;

    append_to_log(
        &config,
        &format!("{}{}) ---", STARTUP_MARKER_PREFIX, std::process::id()),
    )?;
    let _log_guard = init_tracing(&config)?;

    info!(project = %config.project_root.display(), "starting wpd");
    let mut daemon = match lifecycle::startup(&config).await {
        Ok(daemon) => daemon,
        Err(e) => {
            // The non-blocking writer may not flush before exit
            let _ = append_to_log(&config, &format!("ERROR Failed to start daemon: {}", e));
            error!(error = %e, "failed to start daemon");
            return Err(e.into());
        }
    };

    // The spawning client waits for this line
    println!("READY");

    serve(&daemon).await?;
    daemon.shutdown().await?;
    info!("daemon stopped");
    Ok(())
}

/// Accept connections until a signal or a `Shutdown` request arrives
async fn serve(daemon: &DaemonState) -> std::io::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let shutdown = Arc::clone(&daemon.context.shutdown);
    info!(socket = %daemon.config.socket_path.display(), "listening");

    loop {
        tokio::select! {
            accepted = daemon.listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&daemon.context);
                    tokio::spawn(async move {
                        if let Err(e) = server::handle_connection(ctx, stream).await {
                            warn!(error = %e, "connection failed");
                        }
                    });
                }
                Err(e) => error!(error = %e, "accept failed"),
            },
            _ = shutdown.notified() => {
                info!("shutdown requested by client");
                return Ok(());
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM");
                return Ok(());
            }
            _ = sigint.recv() => {
                info!("received SIGINT");
                return Ok(());
            }
        }
    }
}

/// Append one line to the daemon log, outside of tracing
fn append_to_log(config: &Config, line: &str) -> Result<(), LifecycleError> {
    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

fn init_tracing(config: &Config) -> Result<WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let (Some(dir), Some(file_name)) = (config.log_path.parent(), config.log_path.file_name())
    else {
        return Err(LifecycleError::NoStateDir);
    };

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(
        dir, file_name,
    ));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();

    Ok(guard)
}
