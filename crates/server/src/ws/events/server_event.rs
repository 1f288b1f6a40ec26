use serde::Serialize;

use crate::models::MessagePayload;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// New, edited or deleted message. Edits and deletes reuse this
    /// envelope with the updated payload; receivers match on the id.
    Message {
        message: MessagePayload,
    },
    Typing {
        user_id: String,
        is_typing: bool,
    },
    Read {
        message_id: String,
        user_id: String,
    },
    Presence {
        user_id: String,
        online: bool,
    },
    Error {
        message: String,
    },
}
