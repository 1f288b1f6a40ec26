mod server_event;

pub use server_event::ServerEvent;

use serde::Deserialize;

use crate::models::MessageKind;

// ── Client → Server Events ──

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Message {
        #[serde(default)]
        content: String,
        #[serde(default)]
        reply_to: Option<String>,
        #[serde(default)]
        message_type: MessageKind,
        #[serde(default)]
        attachment_ids: Vec<String>,
    },
    Typing {
        is_typing: bool,
    },
    Read {
        message_id: String,
    },
    Edit {
        message_id: String,
        content: String,
    },
    Delete {
        message_id: String,
    },
}
