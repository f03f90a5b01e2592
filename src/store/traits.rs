use super::types::{BlockedWebsite, ChangeEvent, RuleAssignments};
use anyhow::Result;
use tokio::sync::broadcast;

/// The synced bag holding the user's Desired List (key `blockedWebsites`).
///
/// Written only by the add/remove operations; the reconciliation engine just
/// reads it.
#[async_trait::async_trait]
pub trait IdentityStore: Send + Sync {
    async fn load(&self) -> Result<Vec<BlockedWebsite>>;
    async fn save(&self, websites: &[BlockedWebsite]) -> Result<()>;

    /// Registers for change notifications. Dropping the returned
    /// `Subscription` detaches it.
    fn subscribe(&self) -> Subscription;
}

/// The local-only bag holding rule assignments (keys `uuidToRuleIdMap` and
/// `nextRuleId`). Rule IDs are only meaningful on the current device, so this
/// store is never synced. Only the reconciliation engine writes it.
#[async_trait::async_trait]
pub trait MappingStore: Send + Sync {
    async fn load(&self) -> Result<RuleAssignments>;
    async fn save(&self, assignments: &RuleAssignments) -> Result<()>;
}

/// A live registration on a store's change channel.
pub struct Subscription {
    rx: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    pub(crate) fn new(rx: broadcast::Receiver<ChangeEvent>) -> Self {
        Self { rx }
    }

    /// Waits for the next change event. Returns `None` once the store side of
    /// the channel is gone. A lagged receiver skips ahead; that is safe here
    /// because every reconciliation re-reads ground truth anyway.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
