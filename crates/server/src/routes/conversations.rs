use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use carechat_shared::constants::MESSAGE_PAGE_SIZE;

use crate::models::{AuthUser, OpenConversationRequest, SetMuteRequest};
use crate::store::{ReadOutcome, StoreError};
use crate::ws::events::ServerEvent;
use crate::AppState;

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub since_id: Option<i64>,
    pub limit: Option<i64>,
}

fn store_error_response(err: StoreError) -> Response {
    let status = match &err {
        StoreError::ConversationNotFound
        | StoreError::MessageNotFound
        | StoreError::UserNotFound => StatusCode::NOT_FOUND,
        StoreError::NotParticipant | StoreError::NotSender | StoreError::NotPermitted => {
            StatusCode::FORBIDDEN
        }
        StoreError::Db(e) => {
            tracing::error!("store error: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::BAD_REQUEST,
    };

    (
        status,
        Json(serde_json::json!({"error": err.to_string()})),
    )
        .into_response()
}

/// POST /api/conversations
pub async fn open_conversation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<OpenConversationRequest>,
) -> impl IntoResponse {
    match state
        .store
        .open_conversation(&req.patient_id, &req.doctor_id, &user, req.title.as_deref())
        .await
    {
        Ok((conversation, created)) => {
            let status = if created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (status, Json(conversation)).into_response()
        }
        Err(err) => store_error_response(err),
    }
}

/// GET /api/conversations
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> impl IntoResponse {
    match state.store.list_for_user(&user.id).await {
        Ok(summaries) => Json(summaries).into_response(),
        Err(err) => store_error_response(err),
    }
}

/// GET /api/conversations/:conversationId
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(conversation_id): Path<String>,
) -> impl IntoResponse {
    match state.store.is_participant(&conversation_id, &user.id).await {
        Ok(true) => {}
        Ok(false) => return store_error_response(StoreError::NotParticipant),
        Err(err) => return store_error_response(err),
    }

    match state.store.summary_for(&conversation_id, &user.id).await {
        Ok(summary) => Json(summary).into_response(),
        Err(err) => store_error_response(err),
    }
}

/// DELETE /api/conversations/:conversationId
pub async fn deactivate_conversation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(conversation_id): Path<String>,
) -> impl IntoResponse {
    match state.store.deactivate(&conversation_id, &user).await {
        Ok(()) => Json(serde_json::json!({"detail": "Conversation deactivated"})).into_response(),
        Err(err) => store_error_response(err),
    }
}

/// GET /api/conversations/:conversationId/messages
///
/// `since_id` is the last sequence number the client already has;
/// results resume right after it, oldest first.
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(conversation_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    match state.store.is_participant(&conversation_id, &user.id).await {
        Ok(true) => {}
        Ok(false) => return store_error_response(StoreError::NotParticipant),
        Err(err) => return store_error_response(err),
    }

    let limit = query.limit.unwrap_or(MESSAGE_PAGE_SIZE);

    match state
        .store
        .history_since(&conversation_id, query.since_id, limit)
        .await
    {
        Ok(messages) => Json(messages).into_response(),
        Err(err) => store_error_response(err),
    }
}

/// POST /api/conversations/:conversationId/read
pub async fn mark_conversation_read(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(conversation_id): Path<String>,
) -> impl IntoResponse {
    match state
        .store
        .mark_conversation_read(&conversation_id, &user.id)
        .await
    {
        Ok(marked) => Json(serde_json::json!({
            "detail": format!("Marked {} messages as read", marked),
            "marked_count": marked,
        }))
        .into_response(),
        Err(err) => store_error_response(err),
    }
}

/// POST /api/messages/:messageId/read
pub async fn mark_message_read(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(message_id): Path<String>,
) -> impl IntoResponse {
    match state.store.mark_read(&message_id, &user.id).await {
        Ok(ReadOutcome::OwnMessage) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Cannot mark your own message as read"})),
        )
            .into_response(),
        Ok(outcome) => {
            let was_new = outcome == ReadOutcome::Created;
            // Connected clients see the receipt immediately
            if was_new {
                if let Ok(Some(conversation_id)) =
                    state.store.conversation_of_message(&message_id).await
                {
                    state
                        .gateway
                        .broadcast_room(
                            &conversation_id,
                            &ServerEvent::Read {
                                message_id: message_id.clone(),
                                user_id: user.id.clone(),
                            },
                            None,
                        )
                        .await;
                }
            }
            Json(serde_json::json!({
                "detail": "Message marked as read",
                "was_new": was_new,
            }))
            .into_response()
        }
        Err(err) => store_error_response(err),
    }
}

/// POST /api/conversations/:conversationId/mute
pub async fn set_mute(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(conversation_id): Path<String>,
    Json(req): Json<SetMuteRequest>,
) -> impl IntoResponse {
    match state
        .store
        .set_muted(&conversation_id, &user.id, req.muted)
        .await
    {
        Ok(()) => {
            let detail = if req.muted {
                "Conversation muted"
            } else {
                "Conversation unmuted"
            };
            Json(serde_json::json!({"detail": detail})).into_response()
        }
        Err(err) => store_error_response(err),
    }
}

/// GET /api/conversations/:conversationId/files
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(conversation_id): Path<String>,
) -> impl IntoResponse {
    match state.store.is_participant(&conversation_id, &user.id).await {
        Ok(true) => {}
        Ok(false) => return store_error_response(StoreError::NotParticipant),
        Err(err) => return store_error_response(err),
    }

    match state.store.conversation_files(&conversation_id).await {
        Ok(files) => Json(files).into_response(),
        Err(err) => store_error_response(err),
    }
}
