use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Numeric ID in the native rule table. Positive; never recycled.
pub type RuleId = u32;

/// One entry of the user's block list. The uuid is minted when the entry is
/// created and never changes; the url is already normalized (host[+path],
/// no scheme).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedWebsite {
    pub uuid: Uuid,
    pub url: String,
}

/// Durable uuid -> rule ID mapping plus the allocation counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleAssignments {
    #[serde(rename = "uuidToRuleIdMap", default)]
    pub uuid_to_rule_id: FxHashMap<Uuid, RuleId>,
    #[serde(rename = "nextRuleId", default = "default_next_rule_id")]
    pub next_rule_id: RuleId,
}

fn default_next_rule_id() -> RuleId {
    1
}

impl Default for RuleAssignments {
    fn default() -> Self {
        Self {
            uuid_to_rule_id: FxHashMap::default(),
            next_rule_id: default_next_rule_id(),
        }
    }
}

/// Emitted on the change notification channel when a store key is written.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// The `blockedWebsites` key changed; carries the new value.
    BlockedWebsites(Vec<BlockedWebsite>),
}
