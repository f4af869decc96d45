//! kured-alert-silencer binary entrypoint.

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use silencer_cli::{Cli, CliError, DaemonSetLockSource, logging};
use silencer_core::{SilencerConfig, SystemClock};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format, &cli.log_level)?;

    run(cli.into_config()).await?;
    Ok(())
}

async fn run(config: SilencerConfig) -> Result<(), CliError> {
    info!(
        namespace = %config.namespace,
        daemonset = %config.daemonset,
        lock_annotation = %config.lock_annotation,
        alertmanager_url = %config.alertmanager_url,
        silence_duration = ?config.silence_duration,
        matchers = %config.matchers_template,
        on_error = %config.error_policy,
        "starting kured-alert-silencer"
    );

    let store = config.alertmanager_client()?;
    let dispatcher = config.dispatcher(store, Arc::new(SystemClock))?;

    let client = kube::Client::try_default().await?;
    let mut source = DaemonSetLockSource::new(client, &config.namespace, &config.daemonset);

    tokio::select! {
        result = dispatcher.run(&mut source) => {
            let stats = result?;
            warn!(events = stats.events, "daemonset watch ended");
        }
        () = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
