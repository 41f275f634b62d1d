//! Resolution of image attachments given as paths

use std::path::Path;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::error::LlmError;
use crate::types::UserImage;

/// Turns an attachment path into an encoded image
#[async_trait]
pub trait ImageResolver: Send + Sync {
    /// Load and encode the image at `path`
    async fn resolve(&self, path: &Path) -> Result<UserImage, LlmError>;
}

/// Reads images from the local filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct FsImageResolver;

#[async_trait]
impl ImageResolver for FsImageResolver {
    async fn resolve(&self, path: &Path) -> Result<UserImage, LlmError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| LlmError::Image {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let mime = mime_from_path(path);
        tracing::debug!(path = %path.display(), mime, bytes = bytes.len(), "loaded image attachment");

        Ok(UserImage {
            mime: mime.to_owned(),
            base64: STANDARD.encode(bytes),
        })
    }
}

/// Image MIME type guessed from the file extension
pub fn mime_from_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "svg" => "image/svg+xml",
        _ => "image/png",
    }
}
