use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{GmailError, Result};
use crate::models::{Category, SenderRef, Subscription};

/// Last analysis result, kept on disk so bulk commands can reuse it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionCache {
    pub generated_at: DateTime<Utc>,
    pub account: String,
    pub subscriptions: Vec<Subscription>,
}

impl SubscriptionCache {
    pub fn new(account: impl Into<String>, subscriptions: Vec<Subscription>) -> Self {
        Self {
            generated_at: Utc::now(),
            account: account.into(),
            subscriptions,
        }
    }

    /// Save cache to disk
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        tracing::debug!("Saved {} subscriptions to {:?}", self.subscriptions.len(), path);
        Ok(())
    }

    /// Load cache from disk; a missing file is an error
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(GmailError::CacheError(format!(
                "No analysis cache at {:?}. Run `newsletters analyze` first.",
                path
            )));
        }

        let json = tokio::fs::read_to_string(path).await?;
        let cache: Self = serde_json::from_str(&json)?;

        tracing::info!(
            "Loaded analysis cache: account={}, generated_at={}, senders={}",
            cache.account,
            cache.generated_at,
            cache.subscriptions.len()
        );

        Ok(cache)
    }

    /// Senders for the bulk operations, optionally limited to one category
    pub fn senders(&self, category: Option<Category>) -> Vec<SenderRef> {
        self.subscriptions
            .iter()
            .filter(|s| category.map_or(true, |c| s.category == c))
            .map(SenderRef::from)
            .collect()
    }

    pub fn find(&self, sender_email: &str) -> Option<&Subscription> {
        self.subscriptions
            .iter()
            .find(|s| s.sender_email.eq_ignore_ascii_case(sender_email))
    }
}
