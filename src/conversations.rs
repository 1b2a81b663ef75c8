//! Conversation storage and retrieval.
//!
//! Persists full message history to one JSON file per conversation so a
//! session can be resumed later (`--resume` / `/resume` in the CLI). IDs are
//! timestamp-derived, so lexicographic and chronological ordering coincide.

use crate::types::Message;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Lightweight metadata used for conversation listings, without the full
/// message history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMetadata {
    pub id: String,
    pub model: String,
    pub started: String,
    pub ended: String,
    pub message_count: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub first_user_message: String,
}

impl ConversationMetadata {
    /// Short preview for listing, truncated to 60 characters.
    pub fn display_preview(&self) -> String {
        if self.first_user_message.chars().count() > 60 {
            let truncated: String = self.first_user_message.chars().take(60).collect();
            format!("{truncated}...")
        } else {
            self.first_user_message.clone()
        }
    }
}

/// A complete saved conversation, including full message history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub model: String,
    pub system_prompt: String,
    pub history: Vec<Message>,
    pub started: String,
    pub ended: String,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Manages saving and loading conversations under a base directory.
pub struct ConversationStore {
    conversations_dir: PathBuf,
}

impl ConversationStore {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        let conversations_dir = base_dir.join("conversations");
        fs::create_dir_all(&conversations_dir)?;
        Ok(Self { conversations_dir })
    }

    /// Opens the store rooted at [`crate::config::get_conversations_dir`]'s
    /// parent (the store itself appends `conversations/`).
    pub fn from_env() -> Result<Self> {
        let dir = crate::config::get_conversations_dir();
        let base = dir.parent().map(PathBuf::from).unwrap_or(dir.clone());
        Self::new(base)
    }

    fn generate_id(now: DateTime<Utc>) -> String {
        now.format("%Y-%m-%d_%H-%M-%S").to_string()
    }

    fn file_path(&self, conversation_id: &str) -> PathBuf {
        self.conversations_dir.join(format!("{conversation_id}.json"))
    }

    /// Saves a conversation and returns the file path it was written to.
    #[allow(clippy::too_many_arguments)]
    pub fn save(
        &self,
        model: &str,
        system_prompt: &str,
        history: &[Message],
        input_tokens: u64,
        output_tokens: u64,
        started: DateTime<Utc>,
        ended: DateTime<Utc>,
        conversation_id: Option<String>,
    ) -> Result<PathBuf> {
        let conv_id = conversation_id.unwrap_or_else(|| Self::generate_id(started));

        let conversation = Conversation {
            id: conv_id.clone(),
            model: model.to_string(),
            system_prompt: system_prompt.to_string(),
            history: history.to_vec(),
            started: started.to_rfc3339(),
            ended: ended.to_rfc3339(),
            input_tokens,
            output_tokens,
        };

        let file_path = self.file_path(&conv_id);
        let json = serde_json::to_string_pretty(&conversation)?;
        fs::write(&file_path, json)?;
        Ok(file_path)
    }

    /// Loads a conversation by ID, or `None` if it doesn't exist.
    pub fn load(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let file_path = self.file_path(conversation_id);
        if !file_path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&file_path)?;
        let conversation: Conversation = serde_json::from_str(&data)?;
        Ok(Some(conversation))
    }

    /// Lists recent conversations, newest first, up to `limit`. Corrupt
    /// files are skipped.
    pub fn list_conversations(&self, limit: usize) -> Result<Vec<ConversationMetadata>> {
        let mut entries: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
        let dir_entries = match fs::read_dir(&self.conversations_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::from(e)),
        };
        for entry in dir_entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                if let Ok(modified) = meta.modified() {
                    entries.push((path, modified));
                }
            }
        }
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries.truncate(limit);

        let mut results = Vec::with_capacity(entries.len());
        for (path, _) in entries {
            let Ok(data) = fs::read_to_string(&path) else {
                continue;
            };
            let Ok(value) = serde_json::from_str::<serde_json::Value>(&data) else {
                continue;
            };
            let Some(id) = value.get("id").and_then(|v| v.as_str()) else {
                continue;
            };

            let history = value.get("history").and_then(|v| v.as_array());
            let message_count = history.map_or(0, |h| h.len());
            let first_user_message = history
                .and_then(|h| {
                    h.iter().find_map(|m| {
                        let role = m.get("role").and_then(|r| r.as_str())?;
                        let content = m.get("content").and_then(|c| c.as_str())?;
                        if role == "user" && !content.is_empty() {
                            Some(content.to_string())
                        } else {
                            None
                        }
                    })
                })
                .unwrap_or_default();

            results.push(ConversationMetadata {
                id: id.to_string(),
                model: value
                    .get("model")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                started: value
                    .get("started")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                ended: value
                    .get("ended")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                message_count,
                input_tokens: value.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
                output_tokens: value.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
                first_user_message,
            });
        }

        Ok(results)
    }

    /// The ID of the most recently saved conversation, if any.
    pub fn get_latest_id(&self) -> Result<Option<String>> {
        let conversations = self.list_conversations(1)?;
        Ok(conversations.into_iter().next().map(|c| c.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = ConversationStore::new(dir.path().to_path_buf()).unwrap();
        let history = vec![Message::system("be helpful"), Message::user("hello")];
        let started = Utc::now();
        let ended = Utc::now();

        let path = store
            .save("gpt-5-nano", "be helpful", &history, 10, 20, started, ended, Some("conv-1".to_string()))
            .unwrap();
        assert!(path.exists());

        let loaded = store.load("conv-1").unwrap().unwrap();
        assert_eq!(loaded.model, "gpt-5-nano");
        assert_eq!(loaded.history.len(), 2);
        assert_eq!(loaded.input_tokens, 10);
    }

    #[test]
    fn test_load_missing_returns_none() {
        let dir = tempdir().unwrap();
        let store = ConversationStore::new(dir.path().to_path_buf()).unwrap();
        assert!(store.load("nope").unwrap().is_none());
    }

    #[test]
    fn test_list_conversations_newest_first() {
        let dir = tempdir().unwrap();
        let store = ConversationStore::new(dir.path().to_path_buf()).unwrap();
        let now = Utc::now();

        store
            .save("gpt-5-nano", "sys", &[Message::user("first")], 1, 1, now, now, Some("a".to_string()))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        store
            .save("gpt-5-nano", "sys", &[Message::user("second")], 1, 1, now, now, Some("b".to_string()))
            .unwrap();

        let listed = store.list_conversations(10).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "b");
        assert_eq!(listed[0].first_user_message, "second");
    }

    #[test]
    fn test_display_preview_truncates() {
        let meta = ConversationMetadata {
            id: "x".to_string(),
            model: "m".to_string(),
            started: "".to_string(),
            ended: "".to_string(),
            message_count: 0,
            input_tokens: 0,
            output_tokens: 0,
            first_user_message: "a".repeat(100),
        };
        let preview = meta.display_preview();
        assert_eq!(preview.len(), 63); // 60 chars + "..."
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn test_get_latest_id() {
        let dir = tempdir().unwrap();
        let store = ConversationStore::new(dir.path().to_path_buf()).unwrap();
        assert!(store.get_latest_id().unwrap().is_none());

        let now = Utc::now();
        store
            .save("gpt-5-nano", "sys", &[Message::user("hi")], 1, 1, now, now, Some("only".to_string()))
            .unwrap();
        assert_eq!(store.get_latest_id().unwrap(), Some("only".to_string()));
    }
}
