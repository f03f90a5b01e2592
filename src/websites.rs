//! User-facing block list operations.
//!
//! Validation and normalization are enforced here, before an entry ever
//! reaches the reconciliation engine; the engine assumes every url it reads
//! is already in normalized form (host[+path], no scheme).

use crate::store::types::BlockedWebsite;
use crate::store::IdentityStore;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum WebsiteError {
    #[error("not a valid website address: {0:?}")]
    InvalidUrl(String),
    #[error("{0} is already in the block list")]
    AlreadyBlocked(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Splits a raw user-entered address into (host, path). The host is
/// lowercased with userinfo, port and any trailing dot stripped; the path
/// excludes query and fragment. Works on slices, no URL parser needed.
fn split_host_path(raw: &str) -> Option<(String, &str)> {
    let rest = match raw.find("://") {
        Some(idx) => &raw[idx + 3..],
        None => raw,
    };

    let host_end = rest
        .find(['/', '?', '#'])
        .unwrap_or(rest.len());
    let mut host = &rest[..host_end];

    if let Some(at) = host.rfind('@') {
        host = &host[at + 1..];
    }
    if let Some(colon) = host.rfind(':') {
        if !host[colon + 1..].is_empty() && host[colon + 1..].bytes().all(|b| b.is_ascii_digit()) {
            host = &host[..colon];
        }
    }
    let host = host.trim_end_matches('.');
    if host.is_empty() || host.contains([' ', ':', '@']) {
        return None;
    }

    let path = if rest[host_end..].starts_with('/') {
        let after_host = &rest[host_end..];
        let path_end = after_host.find(['?', '#']).unwrap_or(after_host.len());
        after_host[..path_end].trim_end_matches('/')
    } else {
        ""
    };

    Some((host.to_ascii_lowercase(), path))
}

/// A usable website address has a host with at least one dot.
pub fn is_valid_url(raw: &str) -> bool {
    match split_host_path(raw.trim()) {
        Some((host, _)) => host.contains('.'),
        None => false,
    }
}

/// Normalizes to `host[path]`: no scheme, no `www.`, no port, no query,
/// no trailing slash. Returns `None` when no host can be extracted.
pub fn normalize_url(raw: &str) -> Option<String> {
    let (host, path) = split_host_path(raw.trim())?;
    let host = host.strip_prefix("www.").unwrap_or(host.as_str());
    if host.is_empty() {
        return None;
    }
    Some(format!("{}{}", host, path))
}

/// Add/remove/list operations over the synced Desired List.
pub struct WebsiteManager {
    identity: Arc<dyn IdentityStore>,
}

impl WebsiteManager {
    pub fn new(identity: Arc<dyn IdentityStore>) -> Self {
        Self { identity }
    }

    pub async fn list(&self) -> Result<Vec<BlockedWebsite>, WebsiteError> {
        Ok(self.identity.load().await?)
    }

    /// Validates and normalizes the address, mints a fresh uuid and appends
    /// the entry. Duplicates (by normalized url) are rejected.
    pub async fn add(&self, raw: &str) -> Result<BlockedWebsite, WebsiteError> {
        if !is_valid_url(raw) {
            return Err(WebsiteError::InvalidUrl(raw.to_string()));
        }
        let url = normalize_url(raw).ok_or_else(|| WebsiteError::InvalidUrl(raw.to_string()))?;

        let mut websites = self.identity.load().await?;
        if websites.iter().any(|w| w.url == url) {
            return Err(WebsiteError::AlreadyBlocked(url));
        }

        let website = BlockedWebsite {
            uuid: Uuid::new_v4(),
            url,
        };
        websites.push(website.clone());
        self.identity.save(&websites).await?;
        info!("Blocked {} ({})", website.url, website.uuid);
        Ok(website)
    }

    /// Removes the entry with the given uuid. Keyed by uuid rather than url,
    /// so removing one of two momentarily-equal urls is unambiguous. Returns
    /// whether an entry was actually removed.
    pub async fn remove(&self, uuid: Uuid) -> Result<bool, WebsiteError> {
        let websites = self.identity.load().await?;
        let remaining: Vec<BlockedWebsite> =
            websites.iter().filter(|w| w.uuid != uuid).cloned().collect();
        if remaining.len() == websites.len() {
            return Ok(false);
        }
        self.identity.save(&remaining).await?;
        info!("Unblocked entry {}", uuid);
        Ok(true)
    }
}
