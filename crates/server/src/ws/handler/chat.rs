use crate::models::{AuthUser, MessageKind};
use crate::store::{NewMessage, ReadOutcome, StoreError};
use crate::ws::events::ServerEvent;
use crate::ws::gateway::ClientId;
use crate::AppState;

#[allow(clippy::too_many_arguments)]
pub async fn handle_message(
    state: &AppState,
    client_id: ClientId,
    user: &AuthUser,
    conversation_id: &str,
    content: String,
    reply_to: Option<String>,
    message_type: MessageKind,
    attachment_ids: Vec<String>,
) {
    let new = NewMessage {
        conversation_id: conversation_id.to_string(),
        sender_id: user.id.clone(),
        kind: message_type,
        content,
        reply_to,
        attachment_ids,
    };

    let payload = match state.store.append(new).await {
        Ok(payload) => payload,
        Err(err) => {
            send_store_error(state, client_id, err, "Failed to save message").await;
            return;
        }
    };

    // Everyone in the room gets the message, the sender included; the
    // echoed copy doubles as the delivery acknowledgement.
    state
        .gateway
        .broadcast_room(
            conversation_id,
            &ServerEvent::Message {
                message: payload.clone(),
            },
            None,
        )
        .await;

    notify_offline(state, conversation_id, user).await;
}

pub async fn handle_typing(
    state: &AppState,
    client_id: ClientId,
    user: &AuthUser,
    conversation_id: &str,
    is_typing: bool,
) {
    // Ephemeral, never persisted, never echoed back to the typist.
    state
        .gateway
        .broadcast_room(
            conversation_id,
            &ServerEvent::Typing {
                user_id: user.id.clone(),
                is_typing,
            },
            Some(client_id),
        )
        .await;
}

pub async fn handle_read(
    state: &AppState,
    client_id: ClientId,
    user: &AuthUser,
    conversation_id: &str,
    message_id: String,
) {
    if let Err(err) = ensure_in_conversation(state, &message_id, conversation_id).await {
        send_store_error(state, client_id, err, "Failed to mark message read").await;
        return;
    }

    match state.store.mark_read(&message_id, &user.id).await {
        Ok(ReadOutcome::Created) => {
            state
                .gateway
                .broadcast_room(
                    conversation_id,
                    &ServerEvent::Read {
                        message_id,
                        user_id: user.id.clone(),
                    },
                    None,
                )
                .await;
        }
        // Re-reads and own messages are silently absorbed.
        Ok(ReadOutcome::Duplicate) | Ok(ReadOutcome::OwnMessage) => {}
        Err(err) => {
            send_store_error(state, client_id, err, "Failed to mark message read").await;
        }
    }
}

pub async fn handle_edit(
    state: &AppState,
    client_id: ClientId,
    user: &AuthUser,
    conversation_id: &str,
    message_id: String,
    content: String,
) {
    if let Err(err) = ensure_in_conversation(state, &message_id, conversation_id).await {
        send_store_error(state, client_id, err, "Failed to edit message").await;
        return;
    }

    match state.store.edit(&message_id, &user.id, &content).await {
        Ok(payload) => {
            state
                .gateway
                .broadcast_room(conversation_id, &ServerEvent::Message { message: payload }, None)
                .await;
        }
        Err(err) => {
            send_store_error(state, client_id, err, "Failed to edit message").await;
        }
    }
}

pub async fn handle_delete(
    state: &AppState,
    client_id: ClientId,
    user: &AuthUser,
    conversation_id: &str,
    message_id: String,
) {
    if let Err(err) = ensure_in_conversation(state, &message_id, conversation_id).await {
        send_store_error(state, client_id, err, "Failed to delete message").await;
        return;
    }

    match state.store.soft_delete(&message_id, &user.id).await {
        Ok(payload) => {
            // The tombstone goes out in the normal message envelope with
            // its content already cleared.
            state
                .gateway
                .broadcast_room(conversation_id, &ServerEvent::Message { message: payload }, None)
                .await;
        }
        Err(err) => {
            send_store_error(state, client_id, err, "Failed to delete message").await;
        }
    }
}

/// A connection acts only on messages of the conversation it joined.
/// Ids from any other conversation are reported as missing, whether or
/// not the caller is a participant there.
async fn ensure_in_conversation(
    state: &AppState,
    message_id: &str,
    conversation_id: &str,
) -> Result<(), StoreError> {
    match state.store.conversation_of_message(message_id).await? {
        Some(owner) if owner == conversation_id => Ok(()),
        _ => Err(StoreError::MessageNotFound),
    }
}

/// Maps a store failure to an error frame on the originating connection.
/// Database faults are logged and masked; the connection itself stays up.
async fn send_store_error(
    state: &AppState,
    client_id: ClientId,
    err: StoreError,
    db_fallback: &str,
) {
    let message = match &err {
        StoreError::Db(e) => {
            tracing::error!("store operation failed: {:?}", e);
            db_fallback.to_string()
        }
        other => other.to_string(),
    };

    state
        .gateway
        .send_to(client_id, &ServerEvent::Error { message })
        .await;
}

/// Fires the out-of-band nudge for participants with no live connection.
/// Runs detached so a slow SMS gateway never stalls the event loop.
async fn notify_offline(state: &AppState, conversation_id: &str, sender: &AuthUser) {
    let Some(notifier) = state.notifier.clone() else {
        return;
    };

    let candidates = match state
        .store
        .notifiable_participants(conversation_id, &sender.id)
        .await
    {
        Ok(candidates) => candidates,
        Err(err) => {
            tracing::warn!("could not load notification recipients: {}", err);
            return;
        }
    };

    for (user_id, phone) in candidates {
        if state.gateway.is_user_online(conversation_id, &user_id).await {
            continue;
        }
        let notifier = notifier.clone();
        let sender_name = sender.first_name.clone();
        tokio::spawn(async move {
            if let Err(err) = notifier.notify_new_message(&phone, &sender_name).await {
                tracing::warn!(user_id = %user_id, "sms notification failed: {}", err);
            }
        });
    }
}
