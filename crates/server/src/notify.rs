use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use carechat_shared::constants::APP_NAME;

use crate::config::Config;

/// Bearer token for the SMS gateway plus the time we stop trusting it.
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Best-effort SMS nudges for participants who are not connected when a
/// message lands. The gateway token is fetched lazily and shared by all
/// sends until it ages out; a failed send never propagates past a log
/// line.
pub struct SmsNotifier {
    http: reqwest::Client,
    base_url: String,
    email: String,
    password: String,
    sender_id: String,
    token: RwLock<Option<CachedToken>>,
}

impl SmsNotifier {
    /// Returns None when the gateway is not configured, which disables
    /// notifications entirely.
    pub fn from_config(config: &Config) -> Option<SmsNotifier> {
        if config.sms_gateway_url.is_empty()
            || config.sms_gateway_email.is_empty()
            || config.sms_gateway_password.is_empty()
        {
            return None;
        }

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .ok()?;

        Some(SmsNotifier {
            http,
            base_url: config.sms_gateway_url.trim_end_matches('/').to_string(),
            email: config.sms_gateway_email.clone(),
            password: config.sms_gateway_password.clone(),
            sender_id: config.sms_sender_id.clone(),
            token: RwLock::new(None),
        })
    }

    pub async fn notify_new_message(
        &self,
        phone: &str,
        sender_name: &str,
    ) -> Result<(), reqwest::Error> {
        let text = format!("New message from {} on {}", sender_name, APP_NAME);
        self.send_sms(phone, &text).await
    }

    async fn send_sms(&self, phone: &str, text: &str) -> Result<(), reqwest::Error> {
        let token = self.token().await?;

        self.http
            .post(format!("{}/message/sms/send", self.base_url))
            .bearer_auth(token)
            .json(&serde_json::json!({
                "mobile_phone": phone,
                "message": text,
                "from": self.sender_id,
            }))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    /// Current gateway token, refreshed when missing or stale. Readers
    /// share the cached value; only the task that finds it stale logs in
    /// again.
    async fn token(&self) -> Result<String, reqwest::Error> {
        {
            let guard = self.token.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.expires_at > Utc::now() {
                    return Ok(cached.token.clone());
                }
            }
        }

        let mut guard = self.token.write().await;
        // Another task may have refreshed while we waited for the lock
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Utc::now() {
                return Ok(cached.token.clone());
            }
        }

        let response: serde_json::Value = self
            .http
            .post(format!("{}/auth/login", self.base_url))
            .form(&[
                ("email", self.email.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let token = response["data"]["token"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        // Gateway tokens last a month; refresh well before that.
        *guard = Some(CachedToken {
            token: token.clone(),
            expires_at: Utc::now() + Duration::hours(23),
        });

        tracing::info!("sms gateway token refreshed");
        Ok(token)
    }
}
