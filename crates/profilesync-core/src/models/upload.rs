use std::path::Path;

use anyhow::{Context, Result};

use crate::api::ApiError;

/// Largest image the backend accepts (5 MiB).
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Extensions accepted for profile images.
pub const ALLOWED_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

/// An image file ready to be sent as the multipart `image` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Read an image from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read image file: {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("Image path has no file name: {}", path.display()))?
            .to_string();
        Ok(Self { file_name, bytes })
    }

    /// Lowercased extension, if the file name has one.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.file_name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    pub fn mime_type(&self) -> &'static str {
        match self.extension().as_deref() {
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            _ => "application/octet-stream",
        }
    }

    /// Reject files the backend would refuse, before spending a request on them.
    pub fn validate(&self) -> std::result::Result<(), ApiError> {
        if self.bytes.is_empty() {
            return Err(ApiError::ClientError {
                status: 400,
                message: "No image file provided".to_string(),
            });
        }

        let allowed = self
            .extension()
            .map(|ext| ALLOWED_IMAGE_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false);
        if !allowed {
            return Err(ApiError::ClientError {
                status: 400,
                message: format!(
                    "File type not allowed. Allowed types: {}",
                    ALLOWED_IMAGE_EXTENSIONS.join(", ")
                ),
            });
        }

        if self.bytes.len() > MAX_IMAGE_BYTES {
            return Err(ApiError::ClientError {
                status: 413,
                message: format!(
                    "File too large. Maximum size is {}MB",
                    MAX_IMAGE_BYTES / (1024 * 1024)
                ),
            });
        }

        Ok(())
    }
}
