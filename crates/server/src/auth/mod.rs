use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::models::{AuthUser, Role};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing credential")]
    MissingToken,
    #[error("Invalid credential")]
    InvalidToken,
    #[error("Credential expired")]
    Expired,
    #[error("Unknown user")]
    UnknownUser,
    #[error("Account is deactivated")]
    InactiveUser,
    #[error("Unknown role")]
    UnknownRole,
    #[error("Database error")]
    Db(#[from] sqlx::Error),
}

/// Token claims. `sub` is the user id.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|err| match err.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
        _ => AuthError::InvalidToken,
    })
}

/// Verifies a token and resolves it to a live account. Deactivated
/// accounts and accounts with a role outside the known set fail here,
/// even when the token itself is valid.
pub async fn authenticate(
    db: &SqlitePool,
    secret: &str,
    token: &str,
) -> Result<AuthUser, AuthError> {
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }

    let claims = decode_token(token, secret)?;

    let row = sqlx::query_as::<_, (String, String, String, String, String, i64)>(
        "SELECT id, first_name, last_name, phone, role, is_active FROM users WHERE id = ?",
    )
    .bind(&claims.sub)
    .fetch_optional(db)
    .await?
    .ok_or(AuthError::UnknownUser)?;

    let (id, first_name, last_name, phone, role, is_active) = row;

    if is_active == 0 {
        return Err(AuthError::InactiveUser);
    }

    let role = Role::parse(&role).ok_or(AuthError::UnknownRole)?;

    Ok(AuthUser {
        id,
        first_name,
        last_name,
        phone,
        role,
    })
}
