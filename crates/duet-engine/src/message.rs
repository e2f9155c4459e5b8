//! Conversation message model.
//!
//! A [`Message`] is the atomic unit of both the live timeline and the
//! persisted history. User messages carry the raw prompt; bot messages carry
//! a [`DualResponse`] holding one reply per backend.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Banner shown at session start and after every reset.
pub const GREETING: &str = "I am a chatbot, ask me anything.";

/// Unique, time-based message identifier (milliseconds since the epoch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    /// Wrap a raw identifier value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw identifier value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issues strictly increasing [`MessageId`]s.
///
/// Ids follow the wall clock, but two ids requested within the same
/// millisecond (or after a clock step backwards) are bumped past the last
/// issued value, so every id is unique and later ids always sort after
/// earlier ones.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicU64,
}

impl IdGenerator {
    /// Create a new generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next id.
    pub fn next_id(&self) -> MessageId {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return MessageId(candidate),
                Err(actual) => last = actual,
            }
        }
    }
}

/// The pair of replies attached to a bot message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DualResponse {
    /// Reply from backend A (also the banner text for single messages).
    pub response_a: String,
    /// Reply from backend B (empty for single messages).
    pub response_b: String,
    /// Render as a plain banner instead of the side-by-side layout.
    pub show_single: bool,
}

impl DualResponse {
    /// Empty dual content used while both backends are outstanding.
    pub fn pending() -> Self {
        Self::default()
    }

    /// Final dual content.
    pub fn dual(response_a: impl Into<String>, response_b: impl Into<String>) -> Self {
        Self {
            response_a: response_a.into(),
            response_b: response_b.into(),
            show_single: false,
        }
    }

    /// Single-field banner content.
    pub fn single(text: impl Into<String>) -> Self {
        Self {
            response_a: text.into(),
            response_b: String::new(),
            show_single: true,
        }
    }
}

/// Message payload.
///
/// Untagged so that user content serializes as a bare string and bot
/// content as an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Raw prompt typed by the user.
    User(String),
    /// Replies from both backends.
    Bot(DualResponse),
}

/// A single timeline entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier.
    pub id: MessageId,
    /// Whether the user authored this entry.
    pub is_user: bool,
    /// Message payload.
    pub content: MessageContent,
    /// True while the backend calls for this bot message are outstanding.
    #[serde(default)]
    pub loading: bool,
}

impl Message {
    /// Create a user message.
    pub fn user(id: MessageId, prompt: impl Into<String>) -> Self {
        Self {
            id,
            is_user: true,
            content: MessageContent::User(prompt.into()),
            loading: false,
        }
    }

    /// Create a pending bot placeholder with empty dual content.
    pub fn pending_bot(id: MessageId) -> Self {
        Self {
            id,
            is_user: false,
            content: MessageContent::Bot(DualResponse::pending()),
            loading: true,
        }
    }

    /// Create a finalized bot message.
    pub fn bot(id: MessageId, response: DualResponse) -> Self {
        Self {
            id,
            is_user: false,
            content: MessageContent::Bot(response),
            loading: false,
        }
    }

    /// Create the greeting banner.
    pub fn greeting(id: MessageId, text: impl Into<String>) -> Self {
        Self::bot(id, DualResponse::single(text))
    }

    /// The bot replies, if this is a bot message.
    pub fn response(&self) -> Option<&DualResponse> {
        match &self.content {
            MessageContent::Bot(response) => Some(response),
            MessageContent::User(_) => None,
        }
    }

    /// The prompt text, if this is a user message.
    pub fn prompt(&self) -> Option<&str> {
        match &self.content {
            MessageContent::User(prompt) => Some(prompt),
            MessageContent::Bot(_) => None,
        }
    }

    /// Whether this is a single-field banner.
    pub fn is_single(&self) -> bool {
        self.response().is_some_and(|r| r.show_single)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_generator_strictly_increasing() {
        let ids = IdGenerator::new();
        let first = ids.next_id();
        let second = ids.next_id();
        let third = ids.next_id();
        assert!(second > first);
        assert!(third > second);
    }

    #[test]
    fn test_id_generator_tracks_clock() {
        let ids = IdGenerator::new();
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap();
        assert!(ids.next_id().as_u64() >= now);
    }

    #[test]
    fn test_pending_bot_is_empty_dual() {
        let msg = Message::pending_bot(MessageId::new(7));
        assert!(msg.loading);
        assert!(!msg.is_user);
        let response = msg.response().unwrap();
        assert!(response.response_a.is_empty());
        assert!(response.response_b.is_empty());
        assert!(!response.show_single);
    }

    #[test]
    fn test_greeting_is_single() {
        let msg = Message::greeting(MessageId::new(1), GREETING);
        assert!(msg.is_single());
        assert!(!msg.loading);
        assert_eq!(msg.response().unwrap().response_a, GREETING);
        assert!(msg.response().unwrap().response_b.is_empty());
    }

    #[test]
    fn test_user_content_serializes_as_string() {
        let msg = Message::user(MessageId::new(42), "What is 2+2?");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["id"], 42);
        assert_eq!(json["is_user"], true);
        assert_eq!(json["content"], "What is 2+2?");
    }

    #[test]
    fn test_bot_content_preserves_nested_object() {
        let msg = Message::bot(MessageId::new(43), DualResponse::dual("4", "four"));
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
        assert_eq!(parsed.response().unwrap().response_b, "four");
    }

    #[test]
    fn test_missing_loading_defaults_false() {
        let parsed: Message =
            serde_json::from_str(r#"{"id":1,"is_user":true,"content":"hi"}"#).unwrap();
        assert!(!parsed.loading);
        assert_eq!(parsed.prompt(), Some("hi"));
    }
}
