//! vulcand-glue daemon entry point.

use std::sync::Arc;

use log::{error, info};
use tokio::signal;
use tokio::sync::mpsc;

use vulcand_glue::bootstrap;
use vulcand_glue::config::Config;
use vulcand_glue::reconciler::{Policy, Reconciler};
use vulcand_glue::records::KeyLayout;
use vulcand_glue::runtime::{DockerSource, EventSource, RemoteSource};
use vulcand_glue::store::{ConfigStore, EtcdStore, MemoryStore};
use vulcand_glue::types::Variant;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting vulcand-glue with config: {:?}", cfg);

    let store: Arc<dyn ConfigStore> = if cfg.dry_run {
        info!("Dry run: changes are kept in memory only");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(EtcdStore::new(&cfg.etcd_endpoint)?)
    };
    let keys = KeyLayout::new(cfg.namespace.clone());

    bootstrap::ensure_listener(store.as_ref(), &keys, &cfg.listener).await?;

    let source: Box<dyn EventSource> = match cfg.variant {
        Variant::Local => Box::new(DockerSource::new(
            cfg.domain_suffix.clone(),
            cfg.docker.sync_on_start,
        )),
        Variant::Remote => Box::new(RemoteSource::from_config(&cfg.remote, &cfg.domain_suffix)?),
    };
    let reconciler = Reconciler::new(store, keys, Policy::for_variant(cfg.variant));

    // Event channel
    let (event_tx, event_rx) = mpsc::channel(128);

    let source_handle = tokio::spawn(async move {
        if let Err(e) = source.monitor(event_tx).await {
            error!("Event source failed: {}", e);
        }
    });

    let reconcile_handle = tokio::spawn(async move {
        reconciler.run(event_rx).await;
    });

    // Run until the event stream closes or we are told to stop
    tokio::select! {
        res = signal::ctrl_c() => match res {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        },
        res = reconcile_handle => {
            if let Err(e) = res {
                error!("Reconciler task failed: {}", e);
            }
        }
    }

    source_handle.abort();

    info!("Shutdown complete.");
    Ok(())
}
