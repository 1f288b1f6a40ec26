use serde::{Deserialize, Serialize};

use super::UserTiny;

/// What a message carries. Stored as text in `messages.kind`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    File,
    System,
}

impl MessageKind {
    pub fn parse(value: &str) -> Option<MessageKind> {
        match value {
            "text" => Some(MessageKind::Text),
            "file" => Some(MessageKind::File),
            "system" => Some(MessageKind::System),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::File => "file",
            MessageKind::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub seq: i64,
    pub sender_id: String,
    pub kind: String,
    pub content: String,
    pub reply_to_id: Option<String>,
    pub created_at: String,
    pub edited_at: Option<String>,
    pub is_deleted: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attachment {
    pub id: String,
    pub message_id: Option<String>,
    pub uploader_id: String,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub created_at: String,
}

/// Full message as it goes over the wire: the row plus the sender and
/// any linked attachments.
#[derive(Debug, Clone, Serialize)]
pub struct MessagePayload {
    #[serde(flatten)]
    pub message: Message,
    pub sender: UserTiny,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AttachmentWithUploader {
    pub id: String,
    pub message_id: Option<String>,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub created_at: String,
    pub uploader_id: String,
    pub uploader_first_name: String,
    pub uploader_last_name: String,
}
