use crate::engine::Reconciler;
use crate::store::types::ChangeEvent;
use crate::store::IdentityStore;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Re-runs reconciliation whenever the Desired List changes.
///
/// Attach returns a handle owning the background task; call `detach` (or drop
/// the handle) to stop listening. Reconciliation failures are logged and the
/// listener keeps running, so the next change naturally retries.
pub struct ChangeListener {
    handle: JoinHandle<()>,
}

impl ChangeListener {
    pub fn attach(identity: &dyn IdentityStore, reconciler: Arc<Reconciler>) -> Self {
        let mut subscription = identity.subscribe();
        let handle = tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                let ChangeEvent::BlockedWebsites(websites) = event;
                info!("Block list changed ({} entries), reconciling", websites.len());
                if let Err(e) = reconciler.reconcile().await {
                    error!("Reconciliation failed: {:#}", e);
                }
            }
        });
        Self { handle }
    }

    pub fn detach(self) {
        self.handle.abort();
    }
}

impl Drop for ChangeListener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
