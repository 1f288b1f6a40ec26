mod broadcast;

use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, RwLock};

use crate::models::Role;

pub type ClientId = u64;

/// One live WebSocket connection. A connection belongs to exactly one
/// conversation for its whole lifetime; a user with two tabs open holds
/// two entries.
pub struct ConnectedClient {
    pub user_id: String,
    pub role: Role,
    pub conversation_id: String,
    pub tx: mpsc::UnboundedSender<String>,
}

/// In-memory view of who is connected where. Dies with the process;
/// durable membership lives in the participants table.
pub struct GatewayState {
    next_id: RwLock<u64>,
    pub clients: RwLock<HashMap<ClientId, ConnectedClient>>,
    pub rooms: RwLock<HashMap<String, HashSet<ClientId>>>,
}

impl Default for GatewayState {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayState {
    pub fn new() -> Self {
        Self {
            next_id: RwLock::new(1),
            clients: RwLock::new(HashMap::new()),
            rooms: RwLock::new(HashMap::new()),
        }
    }

    pub async fn next_client_id(&self) -> ClientId {
        let mut id = self.next_id.write().await;
        let current = *id;
        *id += 1;
        current
    }

    pub async fn register(
        &self,
        client_id: ClientId,
        user_id: String,
        role: Role,
        conversation_id: String,
        tx: mpsc::UnboundedSender<String>,
    ) {
        let client = ConnectedClient {
            user_id,
            role,
            conversation_id: conversation_id.clone(),
            tx,
        };
        self.clients.write().await.insert(client_id, client);
        self.rooms
            .write()
            .await
            .entry(conversation_id)
            .or_default()
            .insert(client_id);
    }

    pub async fn unregister(&self, client_id: ClientId) -> Option<ConnectedClient> {
        let client = self.clients.write().await.remove(&client_id)?;

        let mut rooms = self.rooms.write().await;
        if let Some(set) = rooms.get_mut(&client.conversation_id) {
            set.remove(&client_id);
            if set.is_empty() {
                rooms.remove(&client.conversation_id);
            }
        }

        Some(client)
    }

    /// True while the user has at least one connection in this room.
    pub async fn is_user_online(&self, conversation_id: &str, user_id: &str) -> bool {
        let rooms = self.rooms.read().await;
        let clients = self.clients.read().await;
        if let Some(member_ids) = rooms.get(conversation_id) {
            for &cid in member_ids {
                if let Some(client) = clients.get(&cid) {
                    if client.user_id == user_id {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Distinct user ids with a live connection in this room.
    pub async fn online_users(&self, conversation_id: &str) -> Vec<String> {
        let rooms = self.rooms.read().await;
        let clients = self.clients.read().await;
        let mut seen = HashSet::new();
        let mut users = Vec::new();
        if let Some(member_ids) = rooms.get(conversation_id) {
            for &cid in member_ids {
                if let Some(client) = clients.get(&cid) {
                    if seen.insert(client.user_id.clone()) {
                        users.push(client.user_id.clone());
                    }
                }
            }
        }
        users
    }
}
