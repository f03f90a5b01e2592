//! JSON-file-backed store adapters.
//!
//! Each bag is one JSON document on disk, written atomically (temp file +
//! rename) so a crash mid-write never leaves a torn bag behind. The synced
//! bag may also be edited by other processes (that is how the list syncs
//! across devices), so `FileIdentityStore` can poll the file's mtime and
//! emit a change event when it was modified externally.

use super::traits::{IdentityStore, MappingStore, Subscription};
use super::types::{BlockedWebsite, ChangeEvent, RuleAssignments};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::sync::broadcast;
use tokio::sync::Mutex;
use tracing::info;

const CHANGE_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Default, Serialize, Deserialize)]
struct SyncBag {
    #[serde(rename = "blockedWebsites", default)]
    blocked_websites: Vec<BlockedWebsite>,
}

async fn read_json_or_default<T: for<'de> Deserialize<'de> + Default>(
    path: &Path,
) -> Result<T> {
    match fs::read_to_string(path).await {
        Ok(contents) => serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

async fn mtime_of(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).await.ok()?.modified().ok()
}

/// Desired List persisted as a JSON file.
pub struct FileIdentityStore {
    path: PathBuf,
    changes: broadcast::Sender<ChangeEvent>,
    // mtime as of our last read or write, for external-edit detection
    last_seen: Mutex<Option<SystemTime>>,
}

impl FileIdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            path: path.into(),
            changes,
            last_seen: Mutex::new(None),
        }
    }

    /// Checks whether another process has modified the bag since we last
    /// touched it, and if so emits a change event with the new contents.
    pub async fn poll_external_change(&self) -> Result<()> {
        let mtime = mtime_of(&self.path).await;
        let mut last_seen = self.last_seen.lock().await;
        if mtime == *last_seen {
            return Ok(());
        }
        *last_seen = mtime;
        drop(last_seen);

        let bag: SyncBag = read_json_or_default(&self.path).await?;
        info!(
            "Detected external change to {} ({} entries)",
            self.path.display(),
            bag.blocked_websites.len()
        );
        let _ = self
            .changes
            .send(ChangeEvent::BlockedWebsites(bag.blocked_websites));
        Ok(())
    }
}

#[async_trait::async_trait]
impl IdentityStore for FileIdentityStore {
    async fn load(&self) -> Result<Vec<BlockedWebsite>> {
        let bag: SyncBag = read_json_or_default(&self.path).await?;
        let mut last_seen = self.last_seen.lock().await;
        *last_seen = mtime_of(&self.path).await;
        Ok(bag.blocked_websites)
    }

    async fn save(&self, websites: &[BlockedWebsite]) -> Result<()> {
        let bag = SyncBag {
            blocked_websites: websites.to_vec(),
        };
        write_json_atomic(&self.path, &bag).await?;
        let mut last_seen = self.last_seen.lock().await;
        *last_seen = mtime_of(&self.path).await;
        drop(last_seen);
        let _ = self
            .changes
            .send(ChangeEvent::BlockedWebsites(websites.to_vec()));
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        Subscription::new(self.changes.subscribe())
    }
}

/// Rule assignments persisted as a JSON file. Local-only; never synced.
pub struct FileMappingStore {
    path: PathBuf,
}

impl FileMappingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl MappingStore for FileMappingStore {
    async fn load(&self) -> Result<RuleAssignments> {
        read_json_or_default(&self.path).await
    }

    async fn save(&self, assignments: &RuleAssignments) -> Result<()> {
        write_json_atomic(&self.path, assignments).await
    }
}
