pub const APP_NAME: &str = "CareChat";

// Limits
pub const MAX_MESSAGE_LENGTH: usize = 4000;
pub const MAX_TITLE_LENGTH: usize = 255;
pub const MAX_ATTACHMENTS_PER_MESSAGE: usize = 10;

pub const MESSAGE_PAGE_SIZE: i64 = 50;

// WebSocket
pub const WS_HEARTBEAT_INTERVAL_MS: u64 = 30_000;
pub const WS_RECONNECT_BASE_DELAY_MS: u64 = 1_000;
pub const WS_RECONNECT_MAX_DELAY_MS: u64 = 30_000;
