use crate::rules::{build_redirect_rule, NativeRule};
use crate::store::types::{BlockedWebsite, RuleAssignments, RuleId};
use rustc_hash::{FxHashMap, FxHashSet};

/// The diff a reconciliation run will apply, plus the assignments to persist
/// once it has landed.
#[derive(Debug, Clone)]
pub struct RulePlan {
    pub rules_to_add: Vec<NativeRule>,
    pub rule_ids_to_remove: Vec<RuleId>,
    pub assignments: RuleAssignments,
}

impl RulePlan {
    pub fn is_converged(&self) -> bool {
        self.rules_to_add.is_empty() && self.rule_ids_to_remove.is_empty()
    }
}

/// Computes the minimal diff between the Desired List and the live rule set.
///
/// Walks the Desired List in order; a uuid that already has an assignment
/// keeps its rule ID, anything else gets the next counter value. A rule is
/// only created when its ID is not live (covers new entries and recovery from
/// a run that persisted the mapping but died before the native write). Live
/// IDs no longer backed by any assignment are scheduled for removal, which
/// also sweeps up orphans left by earlier partial failures.
pub fn plan_rule_changes(
    desired: &[BlockedWebsite],
    prior: &RuleAssignments,
    live_rule_ids: &FxHashSet<RuleId>,
    block_page_url: &str,
) -> RulePlan {
    let mut next_rule_id = prior.next_rule_id;
    let mut uuid_to_rule_id = FxHashMap::default();
    let mut rules_to_add = Vec::new();

    for website in desired {
        let rule_id = match prior.uuid_to_rule_id.get(&website.uuid) {
            Some(&id) => id,
            None => {
                let id = next_rule_id;
                next_rule_id += 1;
                id
            }
        };
        uuid_to_rule_id.insert(website.uuid, rule_id);

        if !live_rule_ids.contains(&rule_id) {
            rules_to_add.push(build_redirect_rule(rule_id, &website.url, block_page_url));
        }
    }

    let assigned: FxHashSet<RuleId> = uuid_to_rule_id.values().copied().collect();
    let mut rule_ids_to_remove: Vec<RuleId> =
        live_rule_ids.difference(&assigned).copied().collect();
    // Deterministic order for logs and tests; the table applies it as one batch.
    rule_ids_to_remove.sort_unstable();

    RulePlan {
        rules_to_add,
        rule_ids_to_remove,
        assignments: RuleAssignments {
            uuid_to_rule_id,
            next_rule_id,
        },
    }
}
