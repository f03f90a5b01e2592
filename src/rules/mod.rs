mod build;
mod table;

pub use build::build_redirect_rule;
pub use table::{
    FileRuleTable, MemoryRuleTable, NativeRule, RedirectTarget, ResourceType, RuleAction,
    RuleCondition, RuleTable, RuleTableUpdate,
};
