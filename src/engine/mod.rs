mod plan;
mod reconciler;

pub use plan::{plan_rule_changes, RulePlan};
pub use reconciler::{ReconcileError, ReconcileOutcome, Reconciler};
