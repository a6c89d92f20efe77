//! Service registry demo.
//!
//! Registers the configured services (or two public JSONPlaceholder
//! endpoints), lets the health monitor promote them, prints the registry
//! snapshot, performs one traced call per service and prints the breaker
//! counters. Without `--once` it keeps running, applying config reloads,
//! until Ctrl+C.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use service_registry::config::watcher::ConfigWatcher;
use service_registry::config::{load_config, ServiceConfig};
use service_registry::lifecycle::{shutdown_signal, Shutdown};
use service_registry::observability::{logging, metrics};
use service_registry::{HealthMonitor, HttpCaller, HttpProbe, Registry, RegistryConfig, RegistryError};

#[derive(Parser)]
#[command(name = "service-registry")]
#[command(about = "Client-side service registry demo", long_about = None)]
struct Cli {
    /// TOML configuration file. Watched for changes while running.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Exit after the first round of calls instead of running until Ctrl+C.
    #[arg(long)]
    once: bool,
}

fn default_services() -> Vec<ServiceConfig> {
    vec![
        ServiceConfig {
            name: "GetSinglePost".to_string(),
            url: "https://jsonplaceholder.typicode.com/posts/1".to_string(),
        },
        ServiceConfig {
            name: "GetAllPosts".to_string(),
            url: "https://jsonplaceholder.typicode.com/posts".to_string(),
        },
    ]
}

/// Register every seed; instances already present are left as they are.
fn register_seeds(registry: &Registry, seeds: &[ServiceConfig]) {
    for seed in seeds {
        match registry.register(&seed.name, &seed.url) {
            Ok(_) => {}
            Err(RegistryError::DuplicateInstance { .. }) => {
                tracing::debug!(service = %seed.name, url = %seed.url, "Seed instance already registered")
            }
            Err(e) => {
                tracing::warn!(service = %seed.name, url = %seed.url, error = %e, "Skipping seed instance")
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RegistryConfig::default(),
    };
    if config.services.is_empty() {
        config.services = default_services();
    }

    logging::init_logging(&config.observability)?;
    tracing::info!("service-registry v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let seeds = config.services.clone();
    let settle = config.health_check.timeout() + Duration::from_millis(250);
    let registry = Arc::new(Registry::new(config));
    register_seeds(&registry, &seeds);

    let shutdown = Shutdown::new();
    let monitor = HealthMonitor::new(registry.clone(), HttpProbe::new());
    let monitor_handle = tokio::spawn(monitor.run(shutdown.subscribe()));

    // The first sweep fires immediately; give it one probe timeout to land.
    tokio::time::sleep(settle).await;

    println!("{}", serde_json::to_string_pretty(&registry.snapshot())?);

    let caller = HttpCaller::new();
    for name in registry.service_names() {
        match registry.call(&name, &caller).await {
            Ok(body) => tracing::info!(service = %name, bytes = body.len(), "Call succeeded"),
            Err(e) => tracing::warn!(service = %name, error = %e, "Call failed"),
        }
        if let Ok(breaker) = registry.breaker(&name) {
            println!("{name}: {}", serde_json::to_string(&breaker)?);
        }
    }

    if !cli.once {
        // Keep the watcher handle alive for as long as we listen.
        let (_watcher, mut updates) = match &cli.config {
            Some(path) => {
                match ConfigWatcher::new(path, registry.config().as_ref().clone()).start() {
                    Ok((handle, rx)) => (Some(handle), Some(rx)),
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to start config watcher");
                        (None, None)
                    }
                }
            }
            None => (None, None),
        };

        let signal = shutdown_signal();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                _ = &mut signal => break,
                Some(new_config) = async {
                    match updates.as_mut() {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    register_seeds(&registry, &new_config.services);
                    registry.apply_config(new_config);
                }
            }
        }
    }

    shutdown.trigger();
    if let Err(e) = monitor_handle.await {
        tracing::error!(error = %e, "Health monitor task failed");
    }

    let removed = registry.shutdown_all();
    tracing::info!(removed, "Shutdown complete");
    Ok(())
}
