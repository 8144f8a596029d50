//! In-memory conversation store implementation.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

use super::traits::{validate_key, ConversationStore, SessionInfo};
use crate::conversation::Conversation;

/// A conversation store backed by a mutex-protected hash map.
pub struct InMemoryConversationStore {
    conversations: Mutex<HashMap<String, (Conversation, DateTime<Utc>)>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self {
            conversations: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load(&self, key: &str) -> Result<Option<Conversation>> {
        validate_key(key)?;
        let conversations = self.conversations.lock();
        Ok(conversations.get(key).map(|(c, _)| c.clone()))
    }

    async fn save(&self, key: &str, conversation: &Conversation) -> Result<()> {
        validate_key(key)?;
        let mut conversations = self.conversations.lock();
        conversations.insert(key.to_string(), (conversation.clone(), Utc::now()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let mut conversations = self.conversations.lock();
        Ok(conversations.remove(key).is_some())
    }

    async fn list(&self) -> Result<Vec<SessionInfo>> {
        let conversations = self.conversations.lock();
        let mut results: Vec<SessionInfo> = conversations
            .iter()
            .map(|(key, (conversation, updated_at))| SessionInfo {
                key: key.clone(),
                messages: conversation.len(),
                updated_at: *updated_at,
            })
            .collect();

        results.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.key.cmp(&b.key))
        });
        Ok(results)
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}
