use crate::store::types::RuleId;
use anyhow::{bail, Context, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::fs;

/// A rule as the native table represents it. Field names mirror the native
/// wire shape (camelCase).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeRule {
    pub id: RuleId,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RuleAction {
    Redirect { redirect: RedirectTarget },
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectTarget {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub regex_filter: String,
    pub resource_types: Vec<ResourceType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
}

/// One atomic batch of changes. Removals are processed before additions.
#[derive(Debug, Default, Clone)]
pub struct RuleTableUpdate {
    pub add_rules: Vec<NativeRule>,
    pub remove_rule_ids: Vec<RuleId>,
}

impl RuleTableUpdate {
    pub fn is_empty(&self) -> bool {
        self.add_rules.is_empty() && self.remove_rule_ids.is_empty()
    }
}

/// The native URL-blocking rule table.
///
/// `apply` must land the whole update or fail without committing partial
/// state. Applying the same update twice must be safe: removals of absent IDs
/// are ignored and an added rule replaces any existing rule with the same ID.
#[async_trait::async_trait]
pub trait RuleTable: Send + Sync {
    async fn active_rules(&self) -> Result<Vec<NativeRule>>;
    async fn apply(&self, update: RuleTableUpdate) -> Result<()>;
}

fn check_no_duplicate_adds(update: &RuleTableUpdate) -> Result<()> {
    let mut seen = FxHashSet::default();
    for rule in &update.add_rules {
        if !seen.insert(rule.id) {
            bail!("Duplicate rule ID {} in a single update", rule.id);
        }
    }
    Ok(())
}

fn apply_to_map(map: &mut FxHashMap<RuleId, NativeRule>, update: RuleTableUpdate) {
    for id in &update.remove_rule_ids {
        map.remove(id);
    }
    for rule in update.add_rules {
        map.insert(rule.id, rule);
    }
}

/// In-memory rule table, used by tests and embedders.
#[derive(Default)]
pub struct MemoryRuleTable {
    rules: RwLock<FxHashMap<RuleId, NativeRule>>,
}

impl MemoryRuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<NativeRule>) -> Self {
        let map = rules.into_iter().map(|r| (r.id, r)).collect();
        Self {
            rules: RwLock::new(map),
        }
    }
}

#[async_trait::async_trait]
impl RuleTable for MemoryRuleTable {
    async fn active_rules(&self) -> Result<Vec<NativeRule>> {
        Ok(self.rules.read().unwrap().values().cloned().collect())
    }

    async fn apply(&self, update: RuleTableUpdate) -> Result<()> {
        check_no_duplicate_adds(&update)?;
        let mut rules = self.rules.write().unwrap();
        apply_to_map(&mut rules, update);
        Ok(())
    }
}

/// Rule table persisted as a JSON file, for running without a native engine.
/// The whole table is rewritten atomically (temp file + rename) per update.
pub struct FileRuleTable {
    path: PathBuf,
}

impl FileRuleTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_rules(path: &Path) -> Result<Vec<NativeRule>> {
        match fs::read_to_string(path).await {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse rule table {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read rule table {}", path.display()))
            }
        }
    }
}

#[async_trait::async_trait]
impl RuleTable for FileRuleTable {
    async fn active_rules(&self) -> Result<Vec<NativeRule>> {
        Self::read_rules(&self.path).await
    }

    async fn apply(&self, update: RuleTableUpdate) -> Result<()> {
        check_no_duplicate_adds(&update)?;

        let mut map: FxHashMap<RuleId, NativeRule> = Self::read_rules(&self.path)
            .await?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();
        apply_to_map(&mut map, update);

        let mut rules: Vec<&NativeRule> = map.values().collect();
        rules.sort_by_key(|r| r.id);

        let contents = serde_json::to_string_pretty(&rules)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, contents)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}
