//! Conversation entities: questions, messages and chat history shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Prefix for locally-minted identifiers of records that were never
/// durably stored (all persistence retries failed).
pub const PLACEHOLDER_PREFIX: &str = "temp-";

/// Identity of a stored record. A `Placeholder` exists only in the process
/// that minted it; mutation paths (bookmark, delete) must refuse it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordId {
    Persisted(String),
    Placeholder(String),
}

impl RecordId {
    /// Mint a fresh local placeholder id.
    pub fn placeholder() -> Self {
        RecordId::Placeholder(format!("{}{}", PLACEHOLDER_PREFIX, Uuid::new_v4()))
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self, RecordId::Persisted(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            RecordId::Persisted(id) | RecordId::Placeholder(id) => id,
        }
    }
}

// Record ids travel as plain strings on the wire; the prefix alone
// distinguishes a placeholder, so round-trips preserve the variant.
impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.starts_with(PLACEHOLDER_PREFIX) {
            Ok(RecordId::Placeholder(raw))
        } else {
            Ok(RecordId::Persisted(raw))
        }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

/// A user-initiated topic of reflection; root of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Denormalized copy of the diagnosis score, present only once a
    /// diagnosis exists. Used for list display.
    #[serde(default)]
    pub score: Option<f64>,
    pub bookmarked: bool,
    pub created_at: DateTime<Utc>,
}

/// One turn of a conversation. Append-only; never edited or reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: RecordId,
    pub question_id: String,
    pub sender: Sender,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build the local stand-in returned when all persistence retries for
    /// a message fail. The conversation keeps moving; the id prefix marks
    /// the record as not durably stored.
    pub fn placeholder(question_id: &str, sender: Sender, content: &str) -> Self {
        Message {
            id: RecordId::placeholder(),
            question_id: question_id.to_string(),
            sender,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Role in completion-service chat history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One history entry as passed to the completion service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage { role: ChatRole::Assistant, content: content.into() }
    }

    /// Map stored messages to completion-service history, preserving order.
    pub fn history(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| ChatMessage {
                role: match m.sender {
                    Sender::User => ChatRole::User,
                    Sender::Ai => ChatRole::Assistant,
                },
                content: m.content.clone(),
            })
            .collect()
    }
}

/// A question with its full message history and diagnosis, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionDetails {
    pub question: Question,
    pub messages: Vec<Message>,
    pub diagnosis: Option<crate::diagnosis::Diagnosis>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_id_prefix() {
        let id = RecordId::placeholder();
        assert!(!id.is_persisted());
        assert!(id.as_str().starts_with(PLACEHOLDER_PREFIX));
    }

    #[test]
    fn test_record_id_roundtrip() {
        let persisted: RecordId = serde_json::from_str("\"a1b2c3\"").unwrap();
        assert_eq!(persisted, RecordId::Persisted("a1b2c3".into()));

        let raw = serde_json::to_string(&RecordId::placeholder()).unwrap();
        let back: RecordId = serde_json::from_str(&raw).unwrap();
        assert!(!back.is_persisted());
    }

    #[test]
    fn test_sender_wire_format() {
        assert_eq!(serde_json::to_string(&Sender::User).unwrap(), "\"user\"");
        assert_eq!(serde_json::to_string(&Sender::Ai).unwrap(), "\"ai\"");
    }

    #[test]
    fn test_history_maps_ai_to_assistant() {
        let messages = vec![
            Message::placeholder("q1", Sender::User, "今の仕事、このままでいいのかな？"),
            Message::placeholder("q1", Sender::Ai, "考えてみましょう"),
        ];
        let history = ChatMessage::history(&messages);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, ChatRole::User);
        assert_eq!(history[1].role, ChatRole::Assistant);
        assert_eq!(history[0].content, "今の仕事、このままでいいのかな？");
    }
}
