use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: String,
    pub title: Option<String>,
    pub patient_id: String,
    pub doctor_id: String,
    pub created_by: String,
    pub is_active: i64,
    // Message counter, only ever touched inside the append transaction.
    #[serde(skip_serializing)]
    pub next_seq: i64,
    pub created_at: String,
    pub last_message_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ParticipantInfo {
    pub user_id: String,
    pub role: String,
    pub first_name: String,
    pub last_name: String,
    pub joined_at: String,
    pub is_muted: i64,
    pub last_seen_at: Option<String>,
}

/// Conversation as listed for a user: the row plus a preview of the
/// latest visible message and how many messages they have not read.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub participants: Vec<ParticipantInfo>,
    pub last_message_preview: Option<String>,
    pub unread_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct OpenConversationRequest {
    pub patient_id: String,
    pub doctor_id: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetMuteRequest {
    pub muted: bool,
}
