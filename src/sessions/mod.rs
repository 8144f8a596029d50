//! Conversation persistence, keyed by a caller-chosen session name.

pub mod file;
pub mod in_memory;
pub mod traits;

pub use file::FileConversationStore;
pub use in_memory::InMemoryConversationStore;
pub use traits::{ConversationStore, SessionInfo};

use crate::config::Config;

/// Create the file store configured under `[sessions]`.
pub fn create_conversation_store(config: &Config) -> Box<dyn ConversationStore> {
    Box::new(FileConversationStore::new(config.sessions_dir()))
}
