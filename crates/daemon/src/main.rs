// SPDX-License-Identifier: MIT

//! `spindled`: the daemon binary. Loads configuration, acquires the
//! process lock, replays the WAL, binds the IPC socket, and runs until
//! a `stop` request or `SIGTERM`/`SIGINT` tells it to drain and exit.

use std::sync::Arc;

use spindle_daemon::{Config, ListenCtx, Listener};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    let file_appender = tracing_appender::rolling::never(&config.state_dir, "spindle.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spindle_daemon=info,spindle_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    info!(state_dir = %config.state_dir.display(), "starting spindled");

    let daemon = Arc::new(spindle_daemon::lifecycle::startup(config).await?);
    let (ripper_lane, encoder_lane) = daemon.workflow.spawn_lanes();

    let shutdown = CancellationToken::new();
    let ctx = Arc::new(ListenCtx {
        daemon: daemon.clone(),
        shutdown: shutdown.clone(),
        dependencies: dependency_versions(),
    });

    let listener = Listener::bind(&daemon.config.socket_path, ctx.clone())?;

    tokio::select! {
        _ = listener.run() => {
            info!("listener stopped itself");
        }
        _ = wait_for_signal() => {
            info!("received termination signal");
            shutdown.cancel();
        }
    }

    ripper_lane.abort();
    encoder_lane.abort();
    daemon.shutdown().await;

    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
                unreachable!()
            }
        };
        tokio::select! {
            _ = term.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn dependency_versions() -> Vec<String> {
    vec!["makemkvcon".to_string(), "HandBrakeCLI".to_string(), "ffmpeg".to_string()]
}
