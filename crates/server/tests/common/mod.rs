#![allow(dead_code)]

pub mod ws_helpers;

use axum::Router;
use carechat_server::{auth::Claims, config::Config, db, routes, store, ws, AppState};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::sync::Arc;

pub const TEST_SECRET: &str = "test-secret";

/// Create an in-memory SQLite pool with schema applied.
pub async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool");

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .unwrap();

    db::run_schema(&pool).await.expect("Failed to run schema");

    pool
}

pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".into(),
        port: 0,
        database_path: ":memory:".into(),
        auth_secret: TEST_SECRET.into(),
        upload_dir: "/tmp/carechat-test-uploads".into(),
        max_upload_bytes: 10_485_760,
        sms_gateway_url: "".into(),
        sms_gateway_email: "".into(),
        sms_gateway_password: "".into(),
        sms_sender_id: "4546".into(),
    }
}

/// Build a test Axum app with the given pool.
pub fn create_test_app(pool: SqlitePool) -> Router {
    routes::build_router(test_state(pool))
}

pub fn test_state(pool: SqlitePool) -> Arc<AppState> {
    Arc::new(AppState {
        db: pool.clone(),
        config: test_config(),
        gateway: Arc::new(ws::gateway::GatewayState::new()),
        store: store::MessageStore::new(pool),
        notifier: None,
    })
}

/// Mint a signed token for a user id, valid for an hour.
pub fn mint_token(user_id: &str) -> String {
    mint_token_with_exp(user_id, chrono::Utc::now().timestamp() + 3600)
}

pub fn mint_token_with_exp(user_id: &str, exp: i64) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .unwrap()
}

/// Create a user directly in the database. Returns (user_id, token).
pub async fn create_test_user(
    pool: &SqlitePool,
    first_name: &str,
    last_name: &str,
    phone: &str,
    role: &str,
) -> (String, String) {
    let user_id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO users (id, first_name, last_name, phone, role, is_active, created_at)
         VALUES (?, ?, ?, ?, ?, 1, ?)",
    )
    .bind(&user_id)
    .bind(first_name)
    .bind(last_name)
    .bind(phone)
    .bind(role)
    .bind(&now)
    .execute(pool)
    .await
    .unwrap();

    let token = mint_token(&user_id);
    (user_id, token)
}

pub async fn deactivate_user(pool: &SqlitePool, user_id: &str) {
    sqlx::query("UPDATE users SET is_active = 0 WHERE id = ?")
        .bind(user_id)
        .execute(pool)
        .await
        .unwrap();
}

/// Create an active conversation with both members as participants.
pub async fn create_test_conversation(
    pool: &SqlitePool,
    patient_id: &str,
    doctor_id: &str,
) -> String {
    let conversation_id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO conversations (id, patient_id, doctor_id, created_by, is_active, next_seq, created_at)
         VALUES (?, ?, ?, ?, 1, 0, ?)",
    )
    .bind(&conversation_id)
    .bind(patient_id)
    .bind(doctor_id)
    .bind(patient_id)
    .bind(&now)
    .execute(pool)
    .await
    .unwrap();

    for (user_id, role) in [(patient_id, "patient"), (doctor_id, "doctor")] {
        sqlx::query(
            "INSERT INTO participants (id, conversation_id, user_id, role, joined_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&conversation_id)
        .bind(user_id)
        .bind(role)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap();
    }

    conversation_id
}

/// Create an attachment record (no actual file on disk).
pub async fn create_test_attachment(
    pool: &SqlitePool,
    uploader_id: &str,
    filename: &str,
    content_type: &str,
) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO attachments (id, message_id, uploader_id, filename, content_type, size, created_at)
         VALUES (?, NULL, ?, ?, ?, 1024, ?)",
    )
    .bind(&id)
    .bind(uploader_id)
    .bind(filename)
    .bind(content_type)
    .bind(&now)
    .execute(pool)
    .await
    .unwrap();
    id
}
