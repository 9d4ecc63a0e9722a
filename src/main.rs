use std::env;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use consul_sd::ConsulDiscovery;
use consul_sd::DiscoverySettings;
use consul_sd::Error;
use consul_sd::Result;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

const REPORT_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = DiscoverySettings::new()?.validate()?;

    // Initializing Logs
    init_observability();

    // Relative tls and secret files are resolved next to the config file
    let base_dir = env::var("CONFIG_PATH")
        .ok()
        .and_then(|p| Path::new(&p).parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));

    let sd_configs = settings.sd_configs.clone();
    let discovery = Arc::new(ConsulDiscovery::new(settings, base_dir));

    let mut acquired = Vec::new();
    for sdc in &sd_configs {
        match discovery.api_config(sdc).await {
            Ok(cfg) => {
                info!(server = %sdc.server, datacenter = cfg.datacenter(), "watching consul catalog");
                acquired.push(sdc.clone());
            }
            Err(e) => error!(server = %sdc.server, error = ?e, "cannot initialize consul_sd_config"),
        }
    }
    if acquired.is_empty() {
        warn!("no consul_sd_config could be initialized");
    }

    // Initializing Shutdown Signal
    let (graceful_tx, mut graceful_rx) = watch::channel(());
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    info!("Application started. Waiting for CTRL+C signal...");
    let mut ticker = tokio::time::interval(REPORT_INTERVAL);
    loop {
        tokio::select! {
            _ = graceful_rx.changed() => break,
            _ = ticker.tick() => {
                for sdc in &acquired {
                    if let Some(nodes) = discovery.service_nodes(sdc) {
                        let instances: usize = nodes.values().map(Vec::len).sum();
                        info!(server = %sdc.server, services = nodes.len(), instances, "discovered targets");
                    }
                }
            }
        }
    }

    for sdc in &acquired {
        discovery.release(sdc);
    }
    info!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).map_err(|e| Error::Fatal(e.to_string()))?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(|e| Error::Fatal(e.to_string()))?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::Fatal(format!("Failed to send shutdown signal: {}", e))
    })?;

    info!("Shutdown completed");
    Ok(())
}

fn init_observability() {
    let base_subscriber = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();
}
