// Upload Validator - format, size and dimension policy for uploaded photos

use super::preview::{PreviewHandle, PreviewStore};
use super::types::{ImageFile, UploadedImage};
use base64::Engine;
use std::io::Cursor;
use std::sync::Arc;

pub const SUPPORTED_MIME_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];
pub const MAX_FILE_SIZE_MB: u64 = 5;
pub const MAX_FILE_SIZE: u64 = MAX_FILE_SIZE_MB * 1024 * 1024;
pub const MIN_DIMENSION: u32 = 512;
/// Decode memory ceiling (1 GiB, room for a 16384x16384 RGBA image)
pub const MAX_DECODE_ALLOC: u64 = 1024 * 1024 * 1024;

/// A successful validation: the upload plus the handle that keeps its preview alive
#[derive(Debug)]
pub struct Validated {
    pub image: UploadedImage,
    pub handle: PreviewHandle,
}

/// Checks files against the upload policy and normalizes them for transport
#[derive(Debug, Clone)]
pub struct UploadValidator {
    previews: Arc<PreviewStore>,
}

impl UploadValidator {
    pub fn new(previews: Arc<PreviewStore>) -> Self {
        Self { previews }
    }

    pub fn previews(&self) -> &Arc<PreviewStore> {
        &self.previews
    }

    /// Validate a file. Checks run in order and the first failure wins.
    pub async fn validate(&self, file: ImageFile) -> Result<Validated, UploadError> {
        if !SUPPORTED_MIME_TYPES.contains(&file.mime_type.as_str()) {
            return Err(UploadError::UnsupportedFormat(file.mime_type));
        }

        if file.size() > MAX_FILE_SIZE {
            return Err(UploadError::FileTooLarge { size: file.size() });
        }

        // The handle exists for the duration of the decode; dropping it on
        // an error path revokes it.
        let handle = self.previews.create(&file.bytes);

        let bytes = file.bytes.clone();
        let (width, height) = tokio::task::spawn_blocking(move || decode_dimensions(&bytes, MAX_DECODE_ALLOC))
            .await
            .map_err(|e| UploadError::UnreadableImage(e.to_string()))??;

        if width < MIN_DIMENSION || height < MIN_DIMENSION {
            tracing::debug!(file = %file.name, width, height, "rejected undersized image");
            return Err(UploadError::ImageTooSmall { width, height });
        }

        let base64 = base64::engine::general_purpose::STANDARD.encode(&file.bytes);

        tracing::info!(file = %file.name, width, height, bytes = file.size(), "upload accepted");

        Ok(Validated {
            image: UploadedImage {
                file,
                base64,
                preview: handle.url().clone(),
                width,
                height,
            },
            handle,
        })
    }
}

/// Fully decode the bytes so corrupt payloads are caught, not just bad headers.
/// Decoding is capped at `max_alloc` bytes; larger images count as unreadable.
fn decode_dimensions(bytes: &[u8], max_alloc: u64) -> Result<(u32, u32), UploadError> {
    let mut reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| UploadError::UnreadableImage(e.to_string()))?;

    let mut limits = image::Limits::default();
    limits.max_alloc = Some(max_alloc);
    reader.limits(limits);

    let image = reader
        .decode()
        .map_err(|e| UploadError::UnreadableImage(e.to_string()))?;

    Ok((image.width(), image.height()))
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("Unsupported format. Please use PNG, JPEG, or WEBP.")]
    UnsupportedFormat(String),

    #[error("File is too large. Max size is {max}MB.", max = MAX_FILE_SIZE_MB)]
    FileTooLarge { size: u64 },

    #[error("Image is too small. Minimum dimensions are {min}x{min}px.", min = MIN_DIMENSION)]
    ImageTooSmall { width: u32, height: u32 },

    #[error("Could not read image file.")]
    UnreadableImage(String),
}
