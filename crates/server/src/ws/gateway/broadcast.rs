use super::{ClientId, GatewayState};
use crate::ws::events::ServerEvent;

impl GatewayState {
    /// Fans an event out to every connection in a room. The event is
    /// serialized once; a connection whose outbound queue is gone is
    /// skipped without affecting the others.
    pub async fn broadcast_room(
        &self,
        conversation_id: &str,
        event: &ServerEvent,
        exclude: Option<ClientId>,
    ) {
        let msg = match serde_json::to_string(event) {
            Ok(m) => m,
            Err(_) => return,
        };

        let rooms = self.rooms.read().await;
        let clients = self.clients.read().await;

        if let Some(member_ids) = rooms.get(conversation_id) {
            for &cid in member_ids {
                if Some(cid) == exclude {
                    continue;
                }
                if let Some(client) = clients.get(&cid) {
                    let _ = client.tx.send(msg.clone());
                }
            }
        }
    }

    pub async fn send_to(&self, client_id: ClientId, event: &ServerEvent) {
        let msg = match serde_json::to_string(event) {
            Ok(m) => m,
            Err(_) => return,
        };

        let clients = self.clients.read().await;
        if let Some(client) = clients.get(&client_id) {
            let _ = client.tx.send(msg);
        }
    }
}
