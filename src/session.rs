//! In-memory session state: the prompt draft, uploaded photos and the last
//! result. Nothing here outlives the process.

use std::io::Cursor;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::constants::{MAX_UPLOAD_FILE_BYTES, MAX_UPLOADS};
use crate::prompt::GenerationMode;

/// Builds a `data:` URI from a MIME type and already-encoded base64 payload.
pub fn data_uri(mime: &str, base64_payload: &str) -> String {
    format!("data:{mime};base64,{base64_payload}")
}

/// Why an upload was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// Nothing was sent.
    Empty,
    /// Larger than [`MAX_UPLOAD_FILE_BYTES`].
    TooLarge(usize),
    /// Not an image we can decode.
    NotAnImage(String),
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadError::Empty => write!(f, "empty upload"),
            UploadError::TooLarge(size) => {
                write!(f, "upload of {size} bytes exceeds {MAX_UPLOAD_FILE_BYTES}")
            }
            UploadError::NotAnImage(reason) => write!(f, "not a supported image: {reason}"),
        }
    }
}

impl std::error::Error for UploadError {}

/// A photo uploaded for collage mode, kept ready for inline display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadedImage {
    /// Original file name, as the browser sent it.
    pub file_name: String,
    /// Sniffed MIME type.
    pub mime: &'static str,
    /// `data:` URI for thumbnails.
    pub data_uri: String,
}

impl UploadedImage {
    /// Sniffs and decodes `bytes`, refusing anything that isn't a real image.
    pub fn from_bytes(file_name: &str, bytes: &[u8]) -> Result<Self, UploadError> {
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if bytes.len() > MAX_UPLOAD_FILE_BYTES {
            return Err(UploadError::TooLarge(bytes.len()));
        }

        let reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|err| UploadError::NotAnImage(err.to_string()))?;
        let format = reader
            .format()
            .ok_or_else(|| UploadError::NotAnImage("unknown format".to_string()))?;
        reader.decode().map_err(|err| {
            debug!("Failed to decode upload {}: {}", file_name, err);
            UploadError::NotAnImage(err.to_string())
        })?;

        let mime = format.to_mime_type();
        let encoded = general_purpose::STANDARD.encode(bytes);
        Ok(Self {
            file_name: file_name.to_string(),
            mime,
            data_uri: data_uri(mime, &encoded),
        })
    }
}

/// Ordered, capped list of uploads. The 5th and later are dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Uploads {
    images: Vec<UploadedImage>,
}

impl Uploads {
    /// Appends in order until full, returning how many were kept.
    pub fn extend(&mut self, images: impl IntoIterator<Item = UploadedImage>) -> usize {
        let mut kept = 0;
        for image in images {
            if self.images.len() >= MAX_UPLOADS {
                debug!("Discarding upload {}, already holding {}", image.file_name, MAX_UPLOADS);
                continue;
            }
            self.images.push(image);
            kept += 1;
        }
        kept
    }

    /// Drops every upload.
    pub fn clear(&mut self) {
        self.images.clear();
    }

    /// Number held.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// True when nothing is held.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// True when no more will be accepted.
    pub fn is_full(&self) -> bool {
        self.images.len() >= MAX_UPLOADS
    }

    /// Uploads in insertion order.
    pub fn as_slice(&self) -> &[UploadedImage] {
        &self.images
    }
}

/// A generated image, held both as bytes and as a data URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedImage {
    /// `data:{mime};base64,...` exactly as rendered.
    pub data_uri: String,
    /// Decoded bytes, served by the result endpoint.
    pub bytes: Vec<u8>,
    /// MIME type reported by the remote (or the default).
    pub mime: String,
    /// When the result arrived.
    pub generated_at: DateTime<Utc>,
}

/// Whatever the last request produced. Overwritten every time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LastResult {
    /// An image to display. Shared, so handing it out doesn't copy the bytes.
    Image(Arc<GeneratedImage>),
    /// A human-readable notice (errors, throttling, empty result).
    Notice(String),
}

impl LastResult {
    /// What the page shows: the data URI or the notice text.
    pub fn display_value(&self) -> &str {
        match self {
            LastResult::Image(image) => &image.data_uri,
            LastResult::Notice(text) => text,
        }
    }

    /// Short machine-readable label.
    pub fn kind(&self) -> ResultKind {
        match self {
            LastResult::Image(_) => ResultKind::Image,
            LastResult::Notice(_) => ResultKind::Notice,
        }
    }
}

/// Kind of the current result, for the status endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    /// No result yet (or cleared by an accepted submit).
    None,
    /// An image.
    Image,
    /// A notice.
    Notice,
}

/// The user's form state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Draft {
    /// Prompt / description text as typed.
    pub prompt_text: String,
    /// Selected mode.
    pub mode: GenerationMode,
}
