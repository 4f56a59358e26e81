//! Messaging service
//!
//! Conversations between users, polled by clients with `after_id`.
//! Unread counts come from each participant's read mark.

use crate::db::repositories::{ConversationRepository, ListingRepository, UserRepository};
use crate::models::{
    normalize_message, Conversation, ConversationSummary, Message, StartConversationInput,
    MAX_MESSAGE_LENGTH,
};
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;

/// Messages returned per poll unless the client asks for fewer
pub const DEFAULT_MESSAGE_LIMIT: i64 = 50;
pub const MAX_MESSAGE_LIMIT: i64 = 200;

#[derive(Debug, thiserror::Error)]
pub enum MessagingServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller is not a participant
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Result of posting into a (possibly new) conversation
#[derive(Debug, Clone, Serialize)]
pub struct ConversationMessage {
    pub conversation: Conversation,
    pub message: Message,
}

pub struct MessagingService {
    conversations: Arc<dyn ConversationRepository>,
    users: Arc<dyn UserRepository>,
    listings: Arc<dyn ListingRepository>,
}

impl MessagingService {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        users: Arc<dyn UserRepository>,
        listings: Arc<dyn ListingRepository>,
    ) -> Self {
        Self {
            conversations,
            users,
            listings,
        }
    }

    /// Message someone, reusing the existing thread about the same listing
    pub async fn start(
        &self,
        sender_id: i64,
        input: StartConversationInput,
    ) -> Result<ConversationMessage, MessagingServiceError> {
        let content = validate_content(&input.content)?;

        if input.recipient_id == sender_id {
            return Err(MessagingServiceError::ValidationError(
                "You cannot message yourself".to_string(),
            ));
        }

        let recipient = self
            .users
            .get_by_id(input.recipient_id)
            .await
            .context("Failed to get recipient")?
            .filter(|u| !u.is_banned())
            .ok_or_else(|| MessagingServiceError::NotFound("Recipient not found".to_string()))?;

        if let Some(listing_id) = input.listing_id {
            if self
                .listings
                .get_by_id(listing_id)
                .await
                .context("Failed to get listing")?
                .is_none()
            {
                return Err(MessagingServiceError::NotFound(
                    "Listing not found".to_string(),
                ));
            }
        }

        let conversation = self
            .find_or_create(sender_id, recipient.id, input.listing_id)
            .await?;
        let message = self
            .conversations
            .add_message(conversation.id, sender_id, &content)
            .await
            .context("Failed to add message")?;

        let conversation = self.reload(conversation.id).await?;
        Ok(ConversationMessage {
            conversation,
            message,
        })
    }

    /// The two-person conversation between `a` and `b` about `listing_id`,
    /// created if it does not exist yet
    pub async fn find_or_create(
        &self,
        a: i64,
        b: i64,
        listing_id: Option<i64>,
    ) -> Result<Conversation, MessagingServiceError> {
        if let Some(existing) = self
            .conversations
            .find_between(a, b, listing_id)
            .await
            .context("Failed to look up conversation")?
        {
            return Ok(existing);
        }

        let created = self
            .conversations
            .create(listing_id, &[a, b])
            .await
            .context("Failed to create conversation")?;

        tracing::debug!(id = created.id, ?listing_id, "Conversation created");
        Ok(created)
    }

    /// Append a message to a conversation the sender takes part in
    pub async fn post(
        &self,
        sender_id: i64,
        conversation_id: i64,
        content: &str,
    ) -> Result<Message, MessagingServiceError> {
        let content = validate_content(content)?;
        self.ensure_participant(conversation_id, sender_id).await?;

        let message = self
            .conversations
            .add_message(conversation_id, sender_id, &content)
            .await
            .context("Failed to add message")?;

        Ok(message)
    }

    /// The user's inbox, most recently active first
    pub async fn list_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<ConversationSummary>, MessagingServiceError> {
        let conversations = self
            .conversations
            .list_for_user(user_id)
            .await
            .context("Failed to list conversations")?;

        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let participants = self
                .conversations
                .other_participants(conversation.id, user_id)
                .await
                .context("Failed to load participants")?;
            let last_message = self
                .conversations
                .last_message(conversation.id)
                .await
                .context("Failed to load last message")?;
            let unread_count = self
                .conversations
                .unread_count(conversation.id, user_id)
                .await
                .context("Failed to count unread messages")?;

            summaries.push(ConversationSummary {
                id: conversation.id,
                listing_id: conversation.listing_id,
                participants,
                last_message,
                unread_count,
                updated_at: conversation.updated_at,
            });
        }

        Ok(summaries)
    }

    /// Poll for messages newer than `after_id` and mark them read
    pub async fn messages(
        &self,
        user_id: i64,
        conversation_id: i64,
        after_id: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, MessagingServiceError> {
        self.ensure_participant(conversation_id, user_id).await?;

        let after_id = after_id.unwrap_or(0).max(0);
        let limit = clamp_limit(limit);
        let messages = self
            .conversations
            .list_messages(conversation_id, after_id, limit)
            .await
            .context("Failed to list messages")?;

        if let Some(last) = messages.last() {
            self.conversations
                .mark_read(conversation_id, user_id, last.id)
                .await
                .context("Failed to mark messages read")?;
        }

        Ok(messages)
    }

    /// Unread messages across all of the user's conversations
    pub async fn unread_total(&self, user_id: i64) -> Result<i64, MessagingServiceError> {
        let total = self
            .conversations
            .total_unread(user_id)
            .await
            .context("Failed to count unread messages")?;

        Ok(total)
    }

    /// 404 for unknown conversations, 403 for outsiders
    async fn ensure_participant(
        &self,
        conversation_id: i64,
        user_id: i64,
    ) -> Result<(), MessagingServiceError> {
        if self
            .conversations
            .get_by_id(conversation_id)
            .await
            .context("Failed to get conversation")?
            .is_none()
        {
            return Err(MessagingServiceError::NotFound(
                "Conversation not found".to_string(),
            ));
        }

        if self
            .conversations
            .get_participant(conversation_id, user_id)
            .await
            .context("Failed to check participant")?
            .is_none()
        {
            return Err(MessagingServiceError::Forbidden(
                "You are not part of this conversation".to_string(),
            ));
        }

        Ok(())
    }

    async fn reload(&self, conversation_id: i64) -> Result<Conversation, MessagingServiceError> {
        self.conversations
            .get_by_id(conversation_id)
            .await
            .context("Failed to reload conversation")?
            .ok_or_else(|| MessagingServiceError::NotFound("Conversation not found".to_string()))
    }
}

fn validate_content(content: &str) -> Result<String, MessagingServiceError> {
    normalize_message(content).ok_or_else(|| {
        MessagingServiceError::ValidationError(format!(
            "Message must be 1 to {} characters",
            MAX_MESSAGE_LENGTH
        ))
    })
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_MESSAGE_LIMIT).clamp(1, MAX_MESSAGE_LIMIT)
}
