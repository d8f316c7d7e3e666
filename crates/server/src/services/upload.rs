//! Staging of uploaded images.
//!
//! An uploaded image is streamed into a temporary file, then folded into the
//! owning record as a `data:<mime>;base64,...` URI. The temporary file never
//! outlives the request: it is removed after encoding, and [`StagedImage`]'s
//! `Drop` removes it on every other path (validation failure, oversize, early
//! return).

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use axum::extract::multipart::Field;
use base64::{engine::general_purpose::STANDARD, Engine};
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

use crate::error::{AppError, Result};

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct UploadService {
    base_path: PathBuf,
}

impl UploadService {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Creates the holding directory and clears anything a previous process
    /// left behind.
    pub async fn init(&self) -> Result<usize> {
        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create upload directory: {e}")))?;
        self.purge().await
    }

    pub async fn purge(&self) -> Result<usize> {
        let mut entries = fs::read_dir(&self.base_path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read upload directory: {e}")))?;

        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if is_file && fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Streams one multipart file field to disk, rejecting non-images and
    /// anything over [`MAX_IMAGE_BYTES`].
    pub async fn stage(&self, mut field: Field<'_>) -> Result<StagedImage> {
        let mime = field.content_type().unwrap_or_default().to_string();
        if !mime.starts_with("image/") {
            return Err(AppError::BadRequest(
                "Only image files are allowed".to_string(),
            ));
        }

        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create upload directory: {e}")))?;

        let mut staged = StagedImage {
            path: self
                .base_path
                .join(format!("temp-{}", Uuid::new_v4().simple())),
            mime,
            len: 0,
            released: false,
        };
        let mut file = fs::File::create(&staged.path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to stage upload: {e}")))?;

        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {e}")))?
        {
            staged.len += chunk.len();
            if staged.len > MAX_IMAGE_BYTES {
                return Err(AppError::BadRequest(
                    "File too large. Maximum size is 5MB".to_string(),
                ));
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to stage upload: {e}")))?;
        }

        file.flush()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to stage upload: {e}")))?;

        Ok(staged)
    }
}

/// An image waiting in the holding directory.
#[derive(Debug)]
pub struct StagedImage {
    path: PathBuf,
    mime: String,
    len: usize,
    released: bool,
}

impl StagedImage {
    #[cfg(test)]
    fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads the staged bytes back as a data URI and deletes the file.
    ///
    /// A read failure yields `None`; the caller carries on without an image.
    pub async fn into_data_uri(mut self) -> Option<String> {
        let read = fs::read(&self.path).await;

        match fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove staged upload {:?}: {e}", self.path),
        }
        self.released = true;

        match read {
            Ok(bytes) => Some(format!(
                "data:{};base64,{}",
                self.mime,
                STANDARD.encode(bytes)
            )),
            Err(e) => {
                tracing::warn!("Failed to encode uploaded image, continuing without it: {e}");
                None
            }
        }
    }
}

impl Drop for StagedImage {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
