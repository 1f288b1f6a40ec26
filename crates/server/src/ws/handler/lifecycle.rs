use crate::models::AuthUser;
use crate::ws::events::ServerEvent;
use crate::ws::gateway::ClientId;
use crate::AppState;

/// Runs once per connection after it has been registered: records the
/// visit, tells the newcomer who is already here, and announces them.
pub async fn handle_join(
    state: &AppState,
    client_id: ClientId,
    user: &AuthUser,
    conversation_id: &str,
) {
    let now = chrono::Utc::now().to_rfc3339();
    if let Err(err) = state
        .store
        .touch_last_seen(conversation_id, &user.id, &now)
        .await
    {
        tracing::warn!(user_id = %user.id, "failed to update last seen: {}", err);
    }

    // Current occupants, sent only to the new connection
    for user_id in state.gateway.online_users(conversation_id).await {
        if user_id != user.id {
            state
                .gateway
                .send_to(
                    client_id,
                    &ServerEvent::Presence {
                        user_id,
                        online: true,
                    },
                )
                .await;
        }
    }

    state
        .gateway
        .broadcast_room(
            conversation_id,
            &ServerEvent::Presence {
                user_id: user.id.clone(),
                online: true,
            },
            Some(client_id),
        )
        .await;
}

/// Final teardown for a connection. Runs whether the peer said goodbye
/// or the socket died mid-frame.
pub async fn handle_disconnect(
    state: &AppState,
    client_id: ClientId,
    user: &AuthUser,
    conversation_id: &str,
) {
    state.gateway.unregister(client_id).await;

    let now = chrono::Utc::now().to_rfc3339();
    if let Err(err) = state
        .store
        .touch_last_seen(conversation_id, &user.id, &now)
        .await
    {
        tracing::warn!(user_id = %user.id, "failed to update last seen: {}", err);
    }

    // A user with another tab still open has not really left.
    if !state
        .gateway
        .is_user_online(conversation_id, &user.id)
        .await
    {
        state
            .gateway
            .broadcast_room(
                conversation_id,
                &ServerEvent::Presence {
                    user_id: user.id.clone(),
                    online: false,
                },
                None,
            )
            .await;
    }

    tracing::info!(
        user_id = %user.id,
        conversation_id = %conversation_id,
        "websocket disconnected"
    );
}
