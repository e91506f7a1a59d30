//! File input surface and display helpers.
//!
//! A [`FileHandle`] is what the composing application hands the chat core
//! when the user picks or drops a file. It can be built directly (for
//! browser-like hosts that already know the metadata) or from a path on
//! the local filesystem.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

use lmschat_proto::message::{FileMeta, MessageKind, Timestamp};

/// Errors that can occur when opening a local file for upload.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    /// Failed to read file metadata.
    #[error("failed to read {path}: {source}")]
    Metadata {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The path exists but is not a regular file.
    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),

    /// The path has no final component to use as the file name.
    #[error("path has no file name: {0}")]
    NoFileName(PathBuf),

    /// The path cannot be expressed as a `file://` URL.
    #[error("cannot build a file URL for {0}")]
    InvalidUrl(PathBuf),
}

/// A file selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    /// Display name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// MIME type.
    pub media_type: String,
    /// Location the content can be fetched from.
    pub url: String,
}

impl FileHandle {
    /// Create a handle from known metadata.
    pub fn new(
        name: impl Into<String>,
        size: u64,
        media_type: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            media_type: media_type.into(),
            url: url.into(),
        }
    }

    /// Open a file on the local filesystem.
    ///
    /// The size comes from the file's metadata, the media type is guessed
    /// from the extension (falling back to `application/octet-stream`), and
    /// the URL is the canonical `file://` URL of the path.
    ///
    /// # Errors
    ///
    /// Returns [`FileError`] if the path cannot be read, is not a regular
    /// file, or has no usable name.
    pub async fn from_path(path: &Path) -> Result<Self, FileError> {
        let metadata_err = |source| FileError::Metadata {
            path: path.to_path_buf(),
            source,
        };
        let canonical = tokio::fs::canonicalize(path).await.map_err(metadata_err)?;
        let metadata = tokio::fs::metadata(&canonical)
            .await
            .map_err(metadata_err)?;
        if !metadata.is_file() {
            return Err(FileError::NotAFile(path.to_path_buf()));
        }

        let name = canonical
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| FileError::NoFileName(path.to_path_buf()))?;
        let media_type = mime_guess::from_path(&canonical)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let url = url::Url::from_file_path(&canonical)
            .map_err(|()| FileError::InvalidUrl(path.to_path_buf()))?
            .to_string();

        Ok(Self {
            name,
            size: metadata.len(),
            media_type,
            url,
        })
    }

    /// Message kind this file will be delivered as.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        MessageKind::for_media_type(&self.media_type)
    }

    /// Convert into the metadata carried by a file or image message.
    #[must_use]
    pub fn into_meta(self) -> FileMeta {
        FileMeta {
            name: self.name,
            size: self.size,
            media_type: self.media_type,
            url: self.url,
        }
    }
}

/// Icon category for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    /// `image/*`
    Image,
    /// Anything with `pdf` in its media type.
    Pdf,
    /// Everything else.
    Other,
}

impl FileCategory {
    /// Categorise a MIME type.
    #[must_use]
    pub fn for_media_type(media_type: &str) -> Self {
        if media_type.starts_with("image/") {
            Self::Image
        } else if media_type.contains("pdf") {
            Self::Pdf
        } else {
            Self::Other
        }
    }

    /// Short label used when listing a file.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Pdf => "PDF",
            Self::Other => "file",
        }
    }
}

/// Human-readable byte size in binary units, e.g. `"1.5 KB"` or `"2 MB"`.
///
/// At most two decimals, trailing zeros dropped, capped at GB.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}

/// Clock time of a message, e.g. `"02:30 PM"`, in the local time zone.
#[must_use]
pub fn format_time(ts: Timestamp) -> String {
    format_in(ts, &chrono::Local, "%I:%M %p")
}

/// Long date of a message, e.g. `"Monday, March 2, 2026"`, in the local
/// time zone.
#[must_use]
pub fn format_date(ts: Timestamp) -> String {
    format_in(ts, &chrono::Local, "%A, %B %-d, %Y")
}

fn format_in<Tz>(ts: Timestamp, tz: &Tz, pattern: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let Some(utc) = i64::try_from(ts.as_millis())
        .ok()
        .and_then(DateTime::from_timestamp_millis)
    else {
        return ts.to_string();
    };
    utc.with_timezone(tz).format(pattern).to_string()
}
