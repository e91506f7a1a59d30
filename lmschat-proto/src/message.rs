//! Message records exchanged between a user and a conversation counterpart.
//!
//! A [`Message`] always belongs to exactly one unordered pair of users
//! (sender and receiver). Messages are immutable once created; the
//! message log that holds them is append-only.

use serde::{Deserialize, Serialize};

use crate::user::UserId;

/// Maximum allowed text payload size in bytes (64 KB).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Unique message identifier.
///
/// Derived from wall-clock milliseconds at creation time and strictly
/// increasing within a process (see `MessageIdAllocator` in the client crate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(u64);

impl MessageId {
    /// Creates a `MessageId` from a raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Returns this timestamp shifted back by `millis`, saturating at the epoch.
    #[must_use]
    pub const fn saturating_sub_millis(&self, millis: u64) -> Self {
        Self(self.0.saturating_sub(millis))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Discriminant of a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text.
    Text,
    /// Non-image file attachment.
    File,
    /// Image attachment.
    Image,
}

impl MessageKind {
    /// Classifies an attachment by its media type: `image/*` is an image,
    /// everything else is a file.
    #[must_use]
    pub fn for_media_type(media_type: &str) -> Self {
        if media_type.starts_with("image/") {
            Self::Image
        } else {
            Self::File
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::File => write!(f, "file"),
            Self::Image => write!(f, "image"),
        }
    }
}

/// Metadata of an attached file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    /// Original file name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// MIME media type (e.g. `application/pdf`).
    pub media_type: String,
    /// URL the file can be retrieved from.
    pub url: String,
}

/// Content of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBody {
    /// Text content.
    Text(String),
    /// A non-image attachment.
    File(FileMeta),
    /// An image attachment.
    Image(FileMeta),
}

impl MessageBody {
    /// Builds an attachment body, choosing [`MessageBody::Image`] for
    /// `image/*` media types and [`MessageBody::File`] otherwise.
    #[must_use]
    pub fn attachment(file: FileMeta) -> Self {
        match MessageKind::for_media_type(&file.media_type) {
            MessageKind::Image => Self::Image(file),
            _ => Self::File(file),
        }
    }

    /// Returns the kind of this body.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Text(_) => MessageKind::Text,
            Self::File(_) => MessageKind::File,
            Self::Image(_) => MessageKind::Image,
        }
    }

    /// Returns the text payload, if this is a text body.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::File(_) | Self::Image(_) => None,
        }
    }

    /// Returns the file metadata, if this is an attachment.
    #[must_use]
    pub const fn file(&self) -> Option<&FileMeta> {
        match self {
            Self::Text(_) => None,
            Self::File(file) | Self::Image(file) => Some(file),
        }
    }
}

/// A single entry of the message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier.
    pub id: MessageId,
    /// Author of the message.
    pub sender_id: UserId,
    /// Addressee of the message.
    pub receiver_id: UserId,
    /// Message content.
    pub body: MessageBody,
    /// When the message was created.
    pub timestamp: Timestamp,
    /// Whether the message has been read. Only synthetic replies are read.
    pub read: bool,
}

/// Error returned when a message fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Message text is empty or whitespace only.
    #[error("message content is empty")]
    Empty,
    /// Message text exceeds the maximum allowed size.
    #[error("message too large ({size} bytes, max {max} bytes)")]
    TooLarge {
        /// Actual size of the text in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },
}

impl Message {
    /// Returns the kind of this message.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// Returns `true` if the unordered pair {sender, receiver} equals {a, b}.
    #[must_use]
    pub fn is_between(&self, a: &UserId, b: &UserId) -> bool {
        (self.sender_id == *a && self.receiver_id == *b)
            || (self.sender_id == *b && self.receiver_id == *a)
    }

    /// Validates a text payload before it becomes a message.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Empty`] if the text is empty or only
    /// whitespace, or [`ValidationError::TooLarge`] if it exceeds
    /// [`MAX_MESSAGE_SIZE`].
    pub fn validate_text(text: &str) -> Result<(), ValidationError> {
        if text.trim().is_empty() {
            return Err(ValidationError::Empty);
        }
        let size = text.len();
        if size > MAX_MESSAGE_SIZE {
            return Err(ValidationError::TooLarge {
                size,
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(())
    }
}
