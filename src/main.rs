use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

use site_warden::config::Config;
use site_warden::engine::Reconciler;
use site_warden::init::{init_stores, setup_logging};
use site_warden::listener::ChangeListener;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load Config
    let config_path = std::env::args().nth(1).unwrap_or("config.toml".to_string());
    let config = if std::path::Path::new(&config_path).exists() {
        Config::load(&config_path).await?
    } else {
        Config::default()
    };

    // 2. Setup Logging
    setup_logging(&config);
    info!("Starting site-warden...");

    if !std::path::Path::new(&config_path).exists() {
        info!("Config file not found, using defaults.");
    }

    // 3. Init Stores & Rule Table
    let (identity_file, identity, mapping, table) = init_stores(&config);

    // 4. Build Reconciler
    let reconciler = Arc::new(Reconciler::new(
        identity.clone(),
        mapping,
        table,
        config.block_page_url.clone(),
    ));

    // 5. Startup Reconciliation (unconditional, covers install and restart)
    match reconciler.reconcile().await {
        Ok(outcome) if outcome.is_noop() => info!("Startup reconciliation: already converged"),
        Ok(outcome) => info!(
            "Startup reconciliation: +{} -{}",
            outcome.rules_added, outcome.rules_removed
        ),
        Err(e) => error!("Startup reconciliation failed: {:#}", e),
    }

    // 6. Attach Change Listener
    let listener = ChangeListener::attach(identity.as_ref(), reconciler.clone());

    // 7. Spawn External-Change Poller
    if config.watch.enable {
        let poll_store = identity_file.clone();
        let interval = Duration::from_secs(config.watch.poll_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = poll_store.poll_external_change().await {
                    error!("Failed to check block list for changes: {:#}", e);
                }
            }
        });
    }

    info!(
        "Watching {} -> rule table {}",
        config.sync_store_path, config.rule_table_path
    );

    // 8. Graceful Shutdown
    signal::ctrl_c().await?;
    info!("Shutdown signal received.");
    listener.detach();

    Ok(())
}
