use super::traits::{IdentityStore, MappingStore, Subscription};
use super::types::{BlockedWebsite, ChangeEvent, RuleAssignments};
use anyhow::Result;
use std::sync::RwLock;
use tokio::sync::broadcast;

const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// In-memory Desired List store, used by tests and embedders.
pub struct MemoryIdentityStore {
    websites: RwLock<Vec<BlockedWebsite>>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            websites: RwLock::new(Vec::new()),
            changes,
        }
    }
}

impl Default for MemoryIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn load(&self) -> Result<Vec<BlockedWebsite>> {
        Ok(self.websites.read().unwrap().clone())
    }

    async fn save(&self, websites: &[BlockedWebsite]) -> Result<()> {
        *self.websites.write().unwrap() = websites.to_vec();
        // No subscribers is fine; the send result is irrelevant then.
        let _ = self
            .changes
            .send(ChangeEvent::BlockedWebsites(websites.to_vec()));
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        Subscription::new(self.changes.subscribe())
    }
}

/// In-memory rule assignment store.
#[derive(Default)]
pub struct MemoryMappingStore {
    assignments: RwLock<RuleAssignments>,
}

impl MemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assignments(assignments: RuleAssignments) -> Self {
        Self {
            assignments: RwLock::new(assignments),
        }
    }
}

#[async_trait::async_trait]
impl MappingStore for MemoryMappingStore {
    async fn load(&self) -> Result<RuleAssignments> {
        Ok(self.assignments.read().unwrap().clone())
    }

    async fn save(&self, assignments: &RuleAssignments) -> Result<()> {
        *self.assignments.write().unwrap() = assignments.clone();
        Ok(())
    }
}
