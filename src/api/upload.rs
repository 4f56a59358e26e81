//! Upload API endpoints
//!
//! - POST /api/v1/upload/image - Upload an image (avatars, listing photos)
//!
//! Stored files are served back from `/uploads/<name>`.

use axum::{
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};

/// Response for successful upload
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
    pub filename: String,
    pub size: u64,
    pub content_type: String,
}

/// Build the upload router
pub fn router() -> Router<AppState> {
    Router::new().route("/image", post(upload_image))
}

/// POST /api/v1/upload/image - Upload a single image
///
/// Accepts multipart/form-data with a single file field named "file".
async fn upload_image(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let config = &state.upload_config;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        if !config.is_type_allowed(&content_type) {
            return Err(ApiError::validation_error(format!(
                "Invalid file type: {}. Allowed types: {}",
                content_type,
                config.allowed_types.join(", ")
            )));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation_error(format!("Failed to read file: {}", e)))?;

        if data.len() as u64 > config.max_file_size {
            return Err(ApiError::validation_error(format!(
                "File too large. Maximum size: {} bytes ({} MB)",
                config.max_file_size,
                config.max_file_size / 1024 / 1024
            )));
        }

        ensure_upload_dir(&config.path).await?;

        let new_filename = format!("{}.{}", Uuid::new_v4(), config.get_extension(&content_type));
        fs::write(config.path.join(&new_filename), &data)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to save file: {}", e)))?;

        tracing::info!(user_id = user.0.id, file = %new_filename, size = data.len(), "Image uploaded");

        return Ok(Json(UploadResponse {
            url: format!("/uploads/{}", new_filename),
            filename: new_filename,
            size: data.len() as u64,
            content_type,
        }));
    }

    Err(ApiError::validation_error("No file provided"))
}

/// Ensure upload directory exists
async fn ensure_upload_dir(path: &Path) -> Result<(), ApiError> {
    if !path.exists() {
        fs::create_dir_all(path)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to create upload dir: {}", e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_upload_dir_creates_nested() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");

        ensure_upload_dir(&nested).await.unwrap();
        assert!(nested.is_dir());

        // second call is a no-op
        ensure_upload_dir(&nested).await.unwrap();
    }
}
