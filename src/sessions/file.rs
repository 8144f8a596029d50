//! File-backed conversation store: one JSON document per key.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::traits::{validate_key, ConversationStore, SessionInfo};
use crate::config::sync_directory;
use crate::conversation::Conversation;

const EXTENSION: &str = "json";

/// Stores each conversation as `<dir>/<key>.json`, replaced atomically on save.
pub struct FileConversationStore {
    dir: PathBuf,
}

impl FileConversationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.{EXTENSION}")))
    }

    async fn read(path: &Path) -> Result<Option<Conversation>> {
        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read session file: {}", path.display()))
            }
        };
        let conversation = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse session file: {}", path.display()))?;
        Ok(Some(conversation))
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn load(&self, key: &str) -> Result<Option<Conversation>> {
        let path = self.path_for(key)?;
        Self::read(&path).await
    }

    async fn save(&self, key: &str, conversation: &Conversation) -> Result<()> {
        let path = self.path_for(key)?;
        let json =
            serde_json::to_vec_pretty(conversation).context("Failed to serialize conversation")?;

        fs::create_dir_all(&self.dir).await.with_context(|| {
            format!("Failed to create sessions directory: {}", self.dir.display())
        })?;

        let temp_path = self
            .dir
            .join(format!(".{key}.{EXTENSION}.tmp-{}", uuid::Uuid::new_v4()));
        let mut temp_file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to create temporary session file: {}",
                    temp_path.display()
                )
            })?;
        temp_file
            .write_all(&json)
            .await
            .context("Failed to write temporary session contents")?;
        temp_file
            .sync_all()
            .await
            .context("Failed to fsync temporary session file")?;
        drop(temp_file);

        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            anyhow::bail!("Failed to atomically replace session file: {e}");
        }
        sync_directory(&self.dir).await?;

        tracing::debug!(key, messages = conversation.len(), "session saved");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to delete session file: {}", path.display())),
        }
    }

    async fn list(&self) -> Result<Vec<SessionInfo>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read sessions directory: {}", self.dir.display())
                })
            }
        };

        let mut results = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_key(key).is_err() {
                continue;
            }
            let conversation = match Self::read(&path).await {
                Ok(Some(conversation)) => conversation,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "skipping unreadable session file"
                    );
                    continue;
                }
            };
            let updated_at = entry
                .metadata()
                .await
                .and_then(|m| m.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            results.push(SessionInfo {
                key: key.to_string(),
                messages: conversation.len(),
                updated_at,
            });
        }

        results.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.key.cmp(&b.key))
        });
        Ok(results)
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Message, Role};
    use tempfile::TempDir;

    #[tokio::test]
    async fn save_then_load_round_trips_structured_content() {
        let tmp = TempDir::new().unwrap();
        let store = FileConversationStore::new(tmp.path().join("sessions"));
        let mut conversation = Conversation::from_user("classify this");
        conversation.push(
            Message::structured(Role::Agent, serde_json::json!({"intent": "Other"}))
                .with_author("classifier")
                .with_warning("low_confidence", "0.4"),
        );

        store.save("chat-1", &conversation).await.unwrap();

        assert!(tmp.path().join("sessions/chat-1.json").exists());
        let loaded = store.load("chat-1").await.unwrap().unwrap();
        assert_eq!(loaded, conversation);
    }

    #[tokio::test]
    async fn load_missing_key_returns_none() {
        let tmp = TempDir::new().unwrap();
        let store = FileConversationStore::new(tmp.path());
        assert!(store.load("nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let store = FileConversationStore::new(tmp.path());
        store
            .save("a", &Conversation::from_user("one"))
            .await
            .unwrap();
        store
            .save("a", &Conversation::from_user("two"))
            .await
            .unwrap();

        let names: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.json".to_string()]);
        let loaded = store.load("a").await.unwrap().unwrap();
        assert_eq!(loaded.messages()[0].text(), "two");
    }

    #[tokio::test]
    async fn list_and_delete() {
        let tmp = TempDir::new().unwrap();
        let store = FileConversationStore::new(tmp.path());
        assert!(store.list().await.unwrap().is_empty());

        store
            .save("first", &Conversation::from_user("x"))
            .await
            .unwrap();
        let mut two = Conversation::from_user("y");
        two.push(Message::agent("z"));
        store.save("second", &two).await.unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let mut sessions = store.list().await.unwrap();
        sessions.sort_by(|a, b| a.key.cmp(&b.key));
        let summary: Vec<_> = sessions.iter().map(|s| (s.key.as_str(), s.messages)).collect();
        assert_eq!(summary, vec![("first", 1), ("second", 2)]);

        assert!(store.delete("first").await.unwrap());
        assert!(!store.delete("first").await.unwrap());
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_skips_corrupt_session_files() {
        let tmp = TempDir::new().unwrap();
        let store = FileConversationStore::new(tmp.path());
        store
            .save("good", &Conversation::from_user("x"))
            .await
            .unwrap();
        std::fs::write(tmp.path().join("bad.json"), "{ not json").unwrap();

        let sessions = store.list().await.unwrap();
        let keys: Vec<_> = sessions.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["good"]);
        assert!(store.load("bad").await.is_err());
    }

    #[tokio::test]
    async fn rejects_keys_that_escape_the_directory() {
        let tmp = TempDir::new().unwrap();
        let store = FileConversationStore::new(tmp.path());
        assert!(store.load("../outside").await.is_err());
        assert!(store.save("a/b", &Conversation::new()).await.is_err());
    }
}
