use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use crate::models::AuthUser;
use crate::AppState;

/// Sniffs the content type from the leading bytes of the stored file.
/// What the client declared is only a fallback; the record reflects what
/// was actually written.
fn sniff_content_type(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("image/png")
    } else if data.starts_with(b"GIF8") {
        Some("image/gif")
    } else if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        Some("image/webp")
    } else if data.starts_with(b"%PDF") {
        Some("application/pdf")
    } else if data.len() >= 12 && &data[4..8] == b"ftyp" {
        Some("video/mp4")
    } else if data.starts_with(&[0x50, 0x4B, 0x03, 0x04]) {
        Some("application/zip")
    } else if data.starts_with(b"ID3") || data.starts_with(&[0xFF, 0xFB]) {
        Some("audio/mpeg")
    } else {
        None
    }
}

/// POST /api/upload
pub async fn upload(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let field = match multipart.next_field().await {
        Ok(Some(f)) => f,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "No file provided"})),
            )
                .into_response()
        }
    };

    let original_filename = field.file_name().unwrap_or("file").to_string();
    let declared_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();

    // Read file data
    let data = match field.bytes().await {
        Ok(d) => d,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Failed to read file"})),
            )
                .into_response()
        }
    };

    let size = data.len() as u64;
    if size == 0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Empty file"})),
        )
            .into_response();
    }
    if size > state.config.max_upload_bytes {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(serde_json::json!({
                "error": format!("File too large. Max size: {} MB", state.config.max_upload_bytes / 1_048_576)
            })),
        )
            .into_response();
    }

    let content_type = sniff_content_type(&data)
        .map(|t| t.to_string())
        .unwrap_or(declared_type);

    let id = uuid::Uuid::new_v4().to_string();

    // Determine extension from original filename
    let ext = original_filename
        .rsplit('.')
        .next()
        .filter(|e| e.len() <= 10 && e.chars().all(|c| c.is_alphanumeric()))
        .unwrap_or("bin");
    let stored_filename = format!("{}.{}", id, ext);

    if tokio::fs::create_dir_all(&state.config.upload_dir).await.is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": "Failed to save file"})),
        )
            .into_response();
    }
    let file_path = std::path::Path::new(&state.config.upload_dir).join(&stored_filename);

    // Write file to disk
    if tokio::fs::write(&file_path, &data).await.is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": "Failed to save file"})),
        )
            .into_response();
    }

    // Size and content type come from the bytes on disk, so the record
    // stays honest even when the client lied in the form field.
    let attachment = match state
        .store
        .create_attachment_with_id(&id, &user.id, &original_filename, &content_type, size as i64)
        .await
    {
        Ok(a) => a,
        Err(err) => {
            // Clean up file on DB error
            let _ = tokio::fs::remove_file(&file_path).await;
            tracing::error!("failed to record attachment: {}", err);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to save attachment record"})),
            )
                .into_response();
        }
    };

    (StatusCode::CREATED, Json(attachment)).into_response()
}

/// GET /api/files/:id/:filename
pub async fn serve_file(
    State(state): State<Arc<AppState>>,
    Path((id, _filename)): Path<(String, String)>,
) -> impl IntoResponse {
    let attachment = match state.store.attachment(&id).await {
        Ok(Some(a)) => a,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "File not found"})),
            )
                .into_response()
        }
        Err(err) => {
            tracing::error!("attachment lookup failed: {}", err);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Database error"})),
            )
                .into_response();
        }
    };

    // Determine stored filename
    let ext = attachment
        .filename
        .rsplit('.')
        .next()
        .filter(|e| e.len() <= 10 && e.chars().all(|c| c.is_alphanumeric()))
        .unwrap_or("bin");
    let stored_filename = format!("{}.{}", id, ext);
    let file_path = std::path::Path::new(&state.config.upload_dir).join(&stored_filename);

    let file = match tokio::fs::File::open(&file_path).await {
        Ok(f) => f,
        Err(_) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "File not found on disk"})),
            )
                .into_response()
        }
    };

    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    let disposition = if attachment.content_type.starts_with("image/")
        || attachment.content_type.starts_with("video/")
        || attachment.content_type.starts_with("audio/")
    {
        "inline".to_string()
    } else {
        format!("attachment; filename=\"{}\"", attachment.filename)
    };

    (
        [
            (header::CONTENT_TYPE, attachment.content_type),
            (header::CONTENT_DISPOSITION, disposition),
            (
                header::CACHE_CONTROL,
                "public, max-age=31536000, immutable".to_string(),
            ),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::sniff_content_type;

    #[test]
    fn sniffs_common_formats() {
        assert_eq!(
            sniff_content_type(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]),
            Some("image/jpeg")
        );
        assert_eq!(
            sniff_content_type(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A]),
            Some("image/png")
        );
        assert_eq!(sniff_content_type(b"%PDF-1.7 rest"), Some("application/pdf"));
    }

    #[test]
    fn unknown_bytes_sniff_to_none() {
        assert_eq!(sniff_content_type(b"hello world"), None);
        assert_eq!(sniff_content_type(&[]), None);
    }
}
