use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use astra_runtime::config::{changed_keys, keys, watcher, ConfigStore};
use astra_runtime::lifecycle::{ServerDescriptor, ServiceLifecycleManager, WorkerState};
use astra_runtime::status::{self, EndpointDirectory};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "astra")]
#[command(about = "Run the Astra configuration store and tool servers")]
struct Cli {
    /// Configuration file (JSON or YAML)
    #[arg(long, short, env = "ASTRA_CONFIG", default_value = "config/config.json")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // The log level lives in the file, so tracing starts after the load
    let store = ConfigStore::new();
    store
        .load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;

    let level = match cli.verbose {
        0 => keys::LOG_LEVEL.value(&store)?,
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    astra_common::init_tracing("astra_runtime", Some(&level))?;
    let loaded_from = store.path().unwrap_or_else(|| cli.config.clone());
    tracing::info!("Loaded configuration from {}", loaded_from.display());

    store.add_watcher(watcher(|old, new| {
        let changed = changed_keys(old, new);
        if changed.is_empty() {
            tracing::debug!("Configuration reloaded with no changes");
        } else {
            tracing::info!("Configuration changed: {}", changed.join(", "));
        }
        Ok(())
    }));

    let directory = EndpointDirectory::new();
    let status_app = status::router(store.clone(), directory.clone());

    let mut manager = ServiceLifecycleManager::new();
    manager.register(ServerDescriptor::from_config(
        &store,
        "status",
        Arc::new(status_app),
    )?)?;
    directory.publish(manager.endpoints());

    if let Err(e) = manager.start_all() {
        tracing::error!("Not every tool server could be started: {}", e);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        for endpoint in manager.endpoints() {
            match manager.wait_until_settled(&endpoint.name, STARTUP_TIMEOUT).await? {
                WorkerState::Running => {
                    tracing::info!("{} available at {}", endpoint.name, endpoint.sse_url())
                }
                state => tracing::warn!("{} is not running: {:?}", endpoint.name, state),
            }
        }

        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutting down");
        anyhow::Ok(())
    })?;

    store.stop_watching();
    let stragglers = manager.shutdown_all(SHUTDOWN_TIMEOUT);
    if !stragglers.is_empty() {
        tracing::warn!("Abandoned tool servers: {}", stragglers.join(", "));
    }

    Ok(())
}
