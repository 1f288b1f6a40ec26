mod chat;
mod lifecycle;

use axum::{
    extract::{Path, State, WebSocketUpgrade, ws::{Message, WebSocket}},
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::auth;
use crate::models::AuthUser;
use crate::ws::events::{ClientEvent, ServerEvent};
use crate::ws::gateway::ClientId;
use crate::AppState;

/// WebSocket upgrade handler for one conversation's live session
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
    query: axum::extract::Query<std::collections::HashMap<String, String>>,
    headers: axum::http::HeaderMap,
) -> impl IntoResponse {
    let auth_user = authenticate_handshake(&state, &headers, &query).await;
    ws.on_upgrade(move |socket| handle_socket(socket, state, conversation_id, auth_user))
}

/// Resolves the handshake credential from the `token` query parameter or
/// an Authorization header. Failures are logged without the token value.
async fn authenticate_handshake(
    state: &AppState,
    headers: &axum::http::HeaderMap,
    query: &std::collections::HashMap<String, String>,
) -> Option<AuthUser> {
    let token_from_query = query.get("token").cloned();

    let token_from_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.to_string());

    let token = match token_from_query.or(token_from_header) {
        Some(t) if !t.is_empty() => t,
        _ => {
            tracing::warn!("websocket handshake without credential");
            return None;
        }
    };

    match auth::authenticate(&state.db, &state.config.auth_secret, &token).await {
        Ok(user) => Some(user),
        Err(err) => {
            tracing::warn!("websocket handshake rejected: {}", err);
            None
        }
    }
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    conversation_id: String,
    auth_user: Option<AuthUser>,
) {
    // Unauthenticated sockets are dropped before they join anything.
    let user = match auth_user {
        Some(u) => u,
        None => return,
    };

    // Joining is gated on durable membership, not on the live registry.
    if let Err(err) = state.store.check_join(&conversation_id, &user.id).await {
        tracing::warn!(
            user_id = %user.id,
            conversation_id = %conversation_id,
            "websocket join refused: {}",
            err
        );
        return;
    }

    let client_id = state.gateway.next_client_id().await;
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    state
        .gateway
        .register(
            client_id,
            user.id.clone(),
            user.role,
            conversation_id.clone(),
            tx,
        )
        .await;

    tracing::info!(
        user_id = %user.id,
        conversation_id = %conversation_id,
        "websocket connected"
    );

    lifecycle::handle_join(&state, client_id, &user, &conversation_id).await;

    // Task to forward messages from mpsc to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // Receive loop
    let state_clone = state.clone();
    let user_clone = user.clone();
    let conversation_clone = conversation_id.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => {
                    let text_str: &str = &text;
                    match serde_json::from_str::<ClientEvent>(text_str) {
                        Ok(event) => {
                            handle_client_event(
                                &state_clone,
                                client_id,
                                &user_clone,
                                &conversation_clone,
                                event,
                            )
                            .await;
                        }
                        Err(_) => {
                            // Malformed frames never kill the connection.
                            state_clone
                                .gateway
                                .send_to(
                                    client_id,
                                    &ServerEvent::Error {
                                        message: "Malformed event".into(),
                                    },
                                )
                                .await;
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    // Runs on every exit path, clean close or not.
    lifecycle::handle_disconnect(&state, client_id, &user, &conversation_id).await;
}

async fn handle_client_event(
    state: &AppState,
    client_id: ClientId,
    user: &AuthUser,
    conversation_id: &str,
    event: ClientEvent,
) {
    match event {
        ClientEvent::Message {
            content,
            reply_to,
            message_type,
            attachment_ids,
        } => {
            chat::handle_message(
                state,
                client_id,
                user,
                conversation_id,
                content,
                reply_to,
                message_type,
                attachment_ids,
            )
            .await;
        }
        ClientEvent::Typing { is_typing } => {
            chat::handle_typing(state, client_id, user, conversation_id, is_typing).await;
        }
        ClientEvent::Read { message_id } => {
            chat::handle_read(state, client_id, user, conversation_id, message_id).await;
        }
        ClientEvent::Edit {
            message_id,
            content,
        } => {
            chat::handle_edit(state, client_id, user, conversation_id, message_id, content).await;
        }
        ClientEvent::Delete { message_id } => {
            chat::handle_delete(state, client_id, user, conversation_id, message_id).await;
        }
    }
}
