//! Conversation repository
//!
//! Database operations for conversations, their participants and messages.

use crate::db::{DynDatabasePool, InsertId};
use crate::models::{Conversation, Message, Participant, ParticipantInfo};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, content, created_at";

/// Conversation repository trait
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Create a conversation with the given participants
    async fn create(&self, listing_id: Option<i64>, participant_ids: &[i64])
        -> Result<Conversation>;

    /// Get conversation by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Conversation>>;

    /// Find the two-person conversation between `a` and `b` about `listing_id`
    async fn find_between(
        &self,
        a: i64,
        b: i64,
        listing_id: Option<i64>,
    ) -> Result<Option<Conversation>>;

    /// Participation record of a user, None if they are not in the conversation
    async fn get_participant(&self, conversation_id: i64, user_id: i64)
        -> Result<Option<Participant>>;

    /// Conversations a user takes part in, most recently active first
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Conversation>>;

    /// Everyone in the conversation except `user_id`
    async fn other_participants(
        &self,
        conversation_id: i64,
        user_id: i64,
    ) -> Result<Vec<ParticipantInfo>>;

    /// Append a message, bump the conversation and mark it read for the sender
    async fn add_message(&self, conversation_id: i64, sender_id: i64, content: &str)
        -> Result<Message>;

    /// Messages with id greater than `after_id`, ascending
    async fn list_messages(
        &self,
        conversation_id: i64,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<Message>>;

    /// Latest message of a conversation
    async fn last_message(&self, conversation_id: i64) -> Result<Option<Message>>;

    /// Raise a participant's read mark to `message_id`; never lowers it
    async fn mark_read(&self, conversation_id: i64, user_id: i64, message_id: i64) -> Result<()>;

    /// Messages from others that `user_id` has not read in one conversation
    async fn unread_count(&self, conversation_id: i64, user_id: i64) -> Result<i64>;

    /// Unread messages across all of a user's conversations
    async fn total_unread(&self, user_id: i64) -> Result<i64>;
}

/// SQLx-based conversation repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxConversationRepository {
    pool: DynDatabasePool,
}

impl SqlxConversationRepository {
    /// Create a new SQLx conversation repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ConversationRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ConversationRepository for SqlxConversationRepository {
    async fn create(
        &self,
        listing_id: Option<i64>,
        participant_ids: &[i64],
    ) -> Result<Conversation> {
        let now = Utc::now();

        let id = on_pool!(self.pool, conn => {
            async {
                let mut tx = conn.begin().await?;
                let id = sqlx::query(
                    "INSERT INTO conversations (listing_id, created_at, updated_at) VALUES (?, ?, ?)",
                )
                .bind(listing_id)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?
                .insert_id();

                for user_id in participant_ids {
                    sqlx::query(
                        "INSERT INTO participants (conversation_id, user_id, last_read_message_id, joined_at) VALUES (?, ?, 0, ?)",
                    )
                    .bind(id)
                    .bind(*user_id)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                }

                tx.commit().await.map(|_| id)
            }
            .await
        })
        .context("Failed to create conversation")?;

        Ok(Conversation {
            id,
            listing_id,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Conversation>> {
        let conversation = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, Conversation>(
                "SELECT id, listing_id, created_at, updated_at FROM conversations WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(conn)
            .await
        })
        .context("Failed to get conversation")?;

        Ok(conversation)
    }

    async fn find_between(
        &self,
        a: i64,
        b: i64,
        listing_id: Option<i64>,
    ) -> Result<Option<Conversation>> {
        let sql = r#"
            SELECT c.id, c.listing_id, c.created_at, c.updated_at
            FROM conversations c
            WHERE ((? IS NULL AND c.listing_id IS NULL) OR c.listing_id = ?)
              AND EXISTS (SELECT 1 FROM participants p WHERE p.conversation_id = c.id AND p.user_id = ?)
              AND EXISTS (SELECT 1 FROM participants p WHERE p.conversation_id = c.id AND p.user_id = ?)
              AND (SELECT COUNT(*) FROM participants p WHERE p.conversation_id = c.id) = 2
            ORDER BY c.id
            LIMIT 1
        "#;
        let conversation = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, Conversation>(sql)
                .bind(listing_id)
                .bind(listing_id)
                .bind(a)
                .bind(b)
                .fetch_optional(conn)
                .await
        })
        .context("Failed to find conversation")?;

        Ok(conversation)
    }

    async fn get_participant(
        &self,
        conversation_id: i64,
        user_id: i64,
    ) -> Result<Option<Participant>> {
        let participant = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, Participant>(
                "SELECT conversation_id, user_id, last_read_message_id, joined_at FROM participants WHERE conversation_id = ? AND user_id = ?",
            )
            .bind(conversation_id)
            .bind(user_id)
            .fetch_optional(conn)
            .await
        })
        .context("Failed to get participant")?;

        Ok(participant)
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Conversation>> {
        let sql = r#"
            SELECT c.id, c.listing_id, c.created_at, c.updated_at
            FROM conversations c
            INNER JOIN participants p ON p.conversation_id = c.id
            WHERE p.user_id = ?
            ORDER BY c.updated_at DESC, c.id DESC
        "#;
        let conversations = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, Conversation>(sql).bind(user_id).fetch_all(conn).await
        })
        .context("Failed to list conversations")?;

        Ok(conversations)
    }

    async fn other_participants(
        &self,
        conversation_id: i64,
        user_id: i64,
    ) -> Result<Vec<ParticipantInfo>> {
        let sql = r#"
            SELECT u.id, u.name, u.avatar
            FROM participants p
            INNER JOIN users u ON u.id = p.user_id
            WHERE p.conversation_id = ? AND p.user_id <> ?
            ORDER BY u.id
        "#;
        let others = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, ParticipantInfo>(sql)
                .bind(conversation_id)
                .bind(user_id)
                .fetch_all(conn)
                .await
        })
        .context("Failed to list participants")?;

        Ok(others)
    }

    async fn add_message(
        &self,
        conversation_id: i64,
        sender_id: i64,
        content: &str,
    ) -> Result<Message> {
        let now = Utc::now();

        let id = on_pool!(self.pool, conn => {
            async {
                let mut tx = conn.begin().await?;
                let id = sqlx::query(
                    "INSERT INTO messages (conversation_id, sender_id, content, created_at) VALUES (?, ?, ?, ?)",
                )
                .bind(conversation_id)
                .bind(sender_id)
                .bind(content)
                .bind(now)
                .execute(&mut *tx)
                .await?
                .insert_id();

                sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
                    .bind(now)
                    .bind(conversation_id)
                    .execute(&mut *tx)
                    .await?;

                sqlx::query(
                    "UPDATE participants SET last_read_message_id = ? WHERE conversation_id = ? AND user_id = ? AND last_read_message_id < ?",
                )
                .bind(id)
                .bind(conversation_id)
                .bind(sender_id)
                .bind(id)
                .execute(&mut *tx)
                .await?;

                tx.commit().await.map(|_| id)
            }
            .await
        })
        .context("Failed to add message")?;

        Ok(Message {
            id,
            conversation_id,
            sender_id,
            content: content.to_string(),
            created_at: now,
        })
    }

    async fn list_messages(
        &self,
        conversation_id: i64,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {} FROM messages WHERE conversation_id = ? AND id > ? ORDER BY id ASC LIMIT ?",
            MESSAGE_COLUMNS
        );
        let messages = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, Message>(&sql)
                .bind(conversation_id)
                .bind(after_id)
                .bind(limit)
                .fetch_all(conn)
                .await
        })
        .context("Failed to list messages")?;

        Ok(messages)
    }

    async fn last_message(&self, conversation_id: i64) -> Result<Option<Message>> {
        let sql = format!(
            "SELECT {} FROM messages WHERE conversation_id = ? ORDER BY id DESC LIMIT 1",
            MESSAGE_COLUMNS
        );
        let message = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, Message>(&sql)
                .bind(conversation_id)
                .fetch_optional(conn)
                .await
        })
        .context("Failed to get last message")?;

        Ok(message)
    }

    async fn mark_read(&self, conversation_id: i64, user_id: i64, message_id: i64) -> Result<()> {
        on_pool!(self.pool, conn => {
            sqlx::query(
                "UPDATE participants SET last_read_message_id = ? WHERE conversation_id = ? AND user_id = ? AND last_read_message_id < ?",
            )
            .bind(message_id)
            .bind(conversation_id)
            .bind(user_id)
            .bind(message_id)
            .execute(conn)
            .await
            .map(|_| ())
        })
        .context("Failed to mark conversation read")?;

        Ok(())
    }

    async fn unread_count(&self, conversation_id: i64, user_id: i64) -> Result<i64> {
        let sql = r#"
            SELECT COUNT(*)
            FROM messages m
            INNER JOIN participants p ON p.conversation_id = m.conversation_id AND p.user_id = ?
            WHERE m.conversation_id = ? AND m.sender_id <> ? AND m.id > p.last_read_message_id
        "#;
        let count: i64 = on_pool!(self.pool, conn => {
            sqlx::query_scalar(sql)
                .bind(user_id)
                .bind(conversation_id)
                .bind(user_id)
                .fetch_one(conn)
                .await
        })
        .context("Failed to count unread messages")?;

        Ok(count)
    }

    async fn total_unread(&self, user_id: i64) -> Result<i64> {
        let sql = r#"
            SELECT COUNT(*)
            FROM messages m
            INNER JOIN participants p ON p.conversation_id = m.conversation_id AND p.user_id = ?
            WHERE m.sender_id <> ? AND m.id > p.last_read_message_id
        "#;
        let count: i64 = on_pool!(self.pool, conn => {
            sqlx::query_scalar(sql)
                .bind(user_id)
                .bind(user_id)
                .fetch_one(conn)
                .await
        })
        .context("Failed to count unread messages")?;

        Ok(count)
    }
}
