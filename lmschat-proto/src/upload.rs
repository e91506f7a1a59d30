//! Transient upload records.
//!
//! An [`UploadingFile`] exists from the moment a file is selected until its
//! upload finishes (successfully or not). Progress only ever moves forward.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::FileMeta;
use crate::user::UserId;

/// Upload progress value at which an upload is complete.
pub const PROGRESS_COMPLETE: u8 = 100;

/// Unique identifier for an in-flight upload (UUID v7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadId(Uuid);

impl UploadId {
    /// Creates a new time-ordered upload identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UploadId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle state of an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadState {
    /// Progress is advancing.
    Ticking,
    /// The message was appended; progress is 100.
    Complete,
    /// The upload could not be turned into a message.
    Failed(String),
    /// The upload was cancelled before completion.
    Cancelled,
}

impl UploadState {
    /// Returns `true` once the upload can no longer change.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Ticking)
    }
}

/// A file currently being uploaded to a conversation counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadingFile {
    /// Upload identifier.
    pub id: UploadId,
    /// The file being uploaded.
    pub file: FileMeta,
    /// Author of the upload.
    pub sender_id: UserId,
    /// Counterpart the file is addressed to.
    pub receiver_id: UserId,
    /// Progress percentage, 0..=100.
    pub progress: u8,
    /// Current lifecycle state.
    pub state: UploadState,
}

impl UploadingFile {
    /// Starts tracking a new upload at 0% progress.
    #[must_use]
    pub fn start(file: FileMeta, sender_id: UserId, receiver_id: UserId) -> Self {
        Self {
            id: UploadId::new(),
            file,
            sender_id,
            receiver_id,
            progress: 0,
            state: UploadState::Ticking,
        }
    }

    /// Advances progress by `step` points, saturating at 100.
    ///
    /// Has no effect once the upload has left the [`UploadState::Ticking`]
    /// state. Returns the resulting progress.
    pub fn advance(&mut self, step: u8) -> u8 {
        if self.state == UploadState::Ticking {
            self.progress = self
                .progress
                .saturating_add(step)
                .min(PROGRESS_COMPLETE);
        }
        self.progress
    }

    /// Marks the upload as complete, forcing progress to 100.
    pub fn complete(&mut self) {
        self.progress = PROGRESS_COMPLETE;
        self.state = UploadState::Complete;
    }
}
