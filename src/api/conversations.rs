//! Messaging API endpoints
//!
//! Clients poll; there is no push channel.
//! - POST /api/v1/conversations - Message someone (creates or reuses a thread)
//! - GET /api/v1/conversations - Caller's conversations with unread counts
//! - GET /api/v1/conversations/{id}/messages - Poll messages after an id
//! - POST /api/v1/conversations/{id}/messages - Post a message
//! - GET /api/v1/messages/unread-count - Total unread

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{ConversationSummary, Message, StartConversationInput};
use crate::services::ConversationMessage;

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
}

/// Polling cursor
#[derive(Debug, Default, Deserialize)]
pub struct MessagesQuery {
    pub after_id: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread: i64,
}

/// POST /api/v1/conversations
pub async fn start_conversation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<StartConversationInput>,
) -> Result<(StatusCode, Json<ConversationMessage>), ApiError> {
    let result = state.messaging_service.start(user.0.id, body).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// GET /api/v1/conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ConversationListResponse>, ApiError> {
    let conversations = state.messaging_service.list_for_user(user.0.id).await?;
    Ok(Json(ConversationListResponse { conversations }))
}

/// GET /api/v1/conversations/{id}/messages?after_id&limit
///
/// Marks the returned messages as read.
pub async fn list_messages(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessageListResponse>, ApiError> {
    let messages = state
        .messaging_service
        .messages(user.0.id, id, query.after_id, query.limit)
        .await?;
    Ok(Json(MessageListResponse { messages }))
}

/// POST /api/v1/conversations/{id}/messages
pub async fn post_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let message = state
        .messaging_service
        .post(user.0.id, id, &body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/v1/messages/unread-count
pub async fn unread_count(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let unread = state.messaging_service.unread_total(user.0.id).await?;
    Ok(Json(UnreadCountResponse { unread }))
}
