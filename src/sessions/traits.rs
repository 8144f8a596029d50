//! Conversation store trait and shared key handling.

use crate::conversation::Conversation;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary of one stored conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionInfo {
    pub key: String,
    pub messages: usize,
    pub updated_at: DateTime<Utc>,
}

/// Persistent storage for conversations, addressed by a caller-chosen key.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Load the conversation stored under `key`, if any.
    async fn load(&self, key: &str) -> Result<Option<Conversation>>;

    /// Replace the conversation stored under `key`.
    async fn save(&self, key: &str, conversation: &Conversation) -> Result<()>;

    /// Remove `key`. Returns whether anything was deleted.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// All stored sessions, most recently updated first.
    async fn list(&self) -> Result<Vec<SessionInfo>>;

    /// The name of this store implementation.
    fn name(&self) -> &str;
}

/// Reject keys that cannot be stored safely.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        anyhow::bail!("session key must not be empty");
    }
    if key.len() > 128 {
        anyhow::bail!("session key too long (max 128 chars)");
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        || key.starts_with('.')
    {
        anyhow::bail!(
            "session key may only contain ASCII letters, digits, '-', '_' and '.', \
             and must not start with '.': {key}"
        );
    }
    Ok(())
}
