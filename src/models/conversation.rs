//! Conversation and message models
//!
//! Conversations are polled by clients. Unread state is a per-participant
//! high-water mark (`last_read_message_id`) rather than per-message flags.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Largest accepted message body, in characters
pub const MAX_MESSAGE_LENGTH: usize = 5000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Conversation {
    pub id: i64,
    /// Listing the conversation is about, if any
    pub listing_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    /// Bumped by every new message
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Participant {
    pub conversation_id: i64,
    pub user_id: i64,
    pub last_read_message_id: i64,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// The other side of a conversation, as shown in the inbox
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct ParticipantInfo {
    pub id: i64,
    pub name: String,
    pub avatar: Option<String>,
}

/// Inbox entry for one conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: i64,
    pub listing_id: Option<i64>,
    pub participants: Vec<ParticipantInfo>,
    pub last_message: Option<Message>,
    pub unread_count: i64,
    pub updated_at: DateTime<Utc>,
}

/// Input for starting (or continuing) a conversation with someone
#[derive(Debug, Clone, Deserialize)]
pub struct StartConversationInput {
    pub recipient_id: i64,
    pub listing_id: Option<i64>,
    pub content: String,
}

/// Trim a message body and check it is postable
pub fn normalize_message(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_MESSAGE_LENGTH {
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_message() {
        assert_eq!(normalize_message("  hello \n").as_deref(), Some("hello"));
        assert!(normalize_message("   ").is_none());
        assert!(normalize_message("").is_none());
    }

    #[test]
    fn test_message_length_limit() {
        let max = "a".repeat(MAX_MESSAGE_LENGTH);
        assert!(normalize_message(&max).is_some());

        let too_long = "a".repeat(MAX_MESSAGE_LENGTH + 1);
        assert!(normalize_message(&too_long).is_none());

        // counted in characters, not bytes
        let multibyte = "é".repeat(MAX_MESSAGE_LENGTH);
        assert!(normalize_message(&multibyte).is_some());
    }
}
