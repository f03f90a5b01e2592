//! Initialization helpers for the application startup.

use crate::config::Config;
use crate::rules::{FileRuleTable, RuleTable};
use crate::store::{FileIdentityStore, FileMappingStore, IdentityStore, MappingStore};
use std::sync::Arc;

/// Sets up the tracing subscriber with the configured filter. The environment
/// (`RUST_LOG`) wins over the config level.
pub fn setup_logging(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

/// Builds the file-backed stores and rule table from the configured paths.
///
/// Returns the concrete identity store alongside the trait objects so the
/// caller can also drive its external-change poller.
pub fn init_stores(
    config: &Config,
) -> (
    Arc<FileIdentityStore>,
    Arc<dyn IdentityStore>,
    Arc<dyn MappingStore>,
    Arc<dyn RuleTable>,
) {
    let identity = Arc::new(FileIdentityStore::new(&config.sync_store_path));
    let mapping = Arc::new(FileMappingStore::new(&config.local_store_path));
    let table = Arc::new(FileRuleTable::new(&config.rule_table_path));
    (identity.clone(), identity, mapping, table)
}
