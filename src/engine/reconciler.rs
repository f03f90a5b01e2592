use super::plan::plan_rule_changes;
use crate::rules::{RuleTable, RuleTableUpdate};
use crate::store::types::RuleId;
use crate::store::{IdentityStore, MappingStore};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// A failed reconciliation attempt. Every variant leaves the mapping store
/// and the rule table in a state the next run can converge from.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Fetching the Desired List, the assignments, or the live rules failed.
    /// Nothing was mutated.
    #[error("failed to read reconciliation inputs: {0}")]
    StorageRead(#[source] anyhow::Error),
    /// The atomic rule table update failed. Assignments were left untouched,
    /// so a retry starts from the same point.
    #[error("native rule table update failed: {0}")]
    NativeUpdate(#[source] anyhow::Error),
    /// The rules landed but persisting the assignments failed. The next run
    /// re-derives the same assignments and retries the save.
    #[error("failed to persist rule assignments: {0}")]
    StorageWrite(#[source] anyhow::Error),
}

/// What a successful run changed in the native table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub rules_added: usize,
    pub rules_removed: usize,
}

impl ReconcileOutcome {
    pub fn is_noop(&self) -> bool {
        self.rules_added == 0 && self.rules_removed == 0
    }
}

/// Drives the rule table and the mapping store to match the Desired List.
///
/// Safe to invoke from overlapping triggers: each run re-reads ground truth
/// before diffing, and the table's `apply` semantics make a duplicate of an
/// in-flight update harmless.
pub struct Reconciler {
    identity: Arc<dyn IdentityStore>,
    mapping: Arc<dyn MappingStore>,
    table: Arc<dyn RuleTable>,
    block_page_url: String,
}

impl Reconciler {
    pub fn new(
        identity: Arc<dyn IdentityStore>,
        mapping: Arc<dyn MappingStore>,
        table: Arc<dyn RuleTable>,
        block_page_url: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            mapping,
            table,
            block_page_url: block_page_url.into(),
        }
    }

    pub async fn reconcile(&self) -> Result<ReconcileOutcome, ReconcileError> {
        // Read all ground truth up front; any failure here aborts with zero
        // mutations.
        let desired = self
            .identity
            .load()
            .await
            .map_err(ReconcileError::StorageRead)?;
        let prior = self
            .mapping
            .load()
            .await
            .map_err(ReconcileError::StorageRead)?;
        let live_rules = self
            .table
            .active_rules()
            .await
            .map_err(ReconcileError::StorageRead)?;
        let live_ids: FxHashSet<RuleId> = live_rules.iter().map(|r| r.id).collect();

        let plan = plan_rule_changes(&desired, &prior, &live_ids, &self.block_page_url);
        let outcome = ReconcileOutcome {
            rules_added: plan.rules_to_add.len(),
            rules_removed: plan.rule_ids_to_remove.len(),
        };

        if plan.is_converged() {
            debug!(
                "Rule table already converged ({} entries, {} live rules)",
                desired.len(),
                live_ids.len()
            );
        } else {
            let update = RuleTableUpdate {
                add_rules: plan.rules_to_add,
                remove_rule_ids: plan.rule_ids_to_remove,
            };
            self.table
                .apply(update)
                .await
                .map_err(ReconcileError::NativeUpdate)?;
            info!(
                "Rule table updated: +{} -{} ({} entries blocked)",
                outcome.rules_added,
                outcome.rules_removed,
                desired.len()
            );
        }

        // Persist only after the native update succeeded, so the stores can
        // never get ahead of the table.
        self.mapping
            .save(&plan.assignments)
            .await
            .map_err(ReconcileError::StorageWrite)?;

        Ok(outcome)
    }
}
