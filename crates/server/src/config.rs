use std::env;

#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub auth_secret: String,
    pub upload_dir: String,
    pub max_upload_bytes: u64,
    pub sms_gateway_url: String,
    pub sms_gateway_email: String,
    pub sms_gateway_password: String,
    pub sms_sender_id: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3001),
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "./carechat.db".into()),
            auth_secret: env::var("AUTH_SECRET").expect("AUTH_SECRET must be set"),
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".into()),
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(52_428_800), // 50MB
            sms_gateway_url: env::var("SMS_GATEWAY_URL").unwrap_or_default(),
            sms_gateway_email: env::var("SMS_GATEWAY_EMAIL").unwrap_or_default(),
            sms_gateway_password: env::var("SMS_GATEWAY_PASSWORD").unwrap_or_default(),
            sms_sender_id: env::var("SMS_SENDER_ID").unwrap_or_else(|_| "4546".into()),
        }
    }
}
