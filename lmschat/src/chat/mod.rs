//! Chat application layer for lmschat.
//!
//! Contains the [`ChatSession`], which wires the conversation directory,
//! the message log, the delivery simulator and the view state together
//! for one signed-in user, and reports everything asynchronous as
//! [`ChatEvent`]s.

pub mod delivery;
pub mod history;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use tokio::sync::mpsc;

use lmschat_proto::conversation::Conversation;
use lmschat_proto::message::{FileMeta, Message, MessageBody, MessageId, ValidationError};
use lmschat_proto::upload::{UploadId, UploadingFile};
use lmschat_proto::user::{User, UserId};

use crate::config::{RetryConfig, SessionConfig};
use crate::directory::{self, Directory, UserRepository};
use crate::files::FileHandle;
use crate::view::ViewState;

use delivery::{DeliverySimulator, ReplyDecision};
use history::{MessageIdAllocator, MessageRepository, StoreError};

/// Number of attachments listed in the contact-detail panel.
pub const SHARED_FILES_LIMIT: usize = 5;

/// Errors that can occur during chat operations.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Message validation failed (too large).
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The message log rejected an operation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The id is not in the current user's conversation directory.
    #[error("no conversation with {0}")]
    UnknownConversation(UserId),

    /// The session has been closed.
    #[error("chat session is closed")]
    Closed,
}

/// Events emitted by the [`ChatSession`] for UI notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A message was appended to the log.
    MessageAppended {
        /// The new message.
        message: Message,
    },
    /// The counterpart will reply to `trigger` after `delay`.
    ReplyScheduled {
        /// The outgoing message being replied to.
        trigger: MessageId,
        /// Time until the reply lands.
        delay: Duration,
    },
    /// A file upload began.
    UploadStarted {
        /// Snapshot of the new upload at 0%.
        upload: UploadingFile,
    },
    /// An upload advanced.
    UploadProgress {
        /// Upload identifier.
        id: UploadId,
        /// New progress percentage.
        progress: u8,
    },
    /// An upload finished and its message was appended.
    UploadCompleted {
        /// Upload identifier.
        id: UploadId,
        /// The file or image message it produced.
        message_id: MessageId,
    },
    /// An upload finished but its message could not be stored.
    UploadFailed {
        /// Upload identifier.
        id: UploadId,
        /// Why the message was not stored.
        reason: String,
    },
    /// An upload was cancelled before completion.
    UploadCancelled {
        /// Upload identifier.
        id: UploadId,
    },
}

/// Why a send produced no message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No conversation is selected.
    NoActiveConversation,
    /// The text was empty or whitespace only.
    EmptyMessage,
}

/// Result of [`ChatSession::send_text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The message was appended.
    Sent {
        /// The stored message.
        message: Message,
        /// Whether the counterpart will answer.
        reply: ReplyDecision,
    },
    /// Nothing was appended or scheduled.
    Skipped(SkipReason),
}

/// One signed-in user's chat page.
///
/// Dropping the session (or calling [`close`](Self::close)) cancels every
/// pending reply and upload.
pub struct ChatSession<R: MessageRepository + 'static> {
    current_user: User,
    directory: Directory,
    repository: Arc<R>,
    ids: Arc<MessageIdAllocator>,
    rng: Arc<Mutex<StdRng>>,
    simulator: DeliverySimulator<R>,
    view: ViewState,
    retry: RetryConfig,
    online_probability: f64,
    event_tx: mpsc::Sender<ChatEvent>,
}

impl<R: MessageRepository + 'static> ChatSession<R> {
    /// Open a session for `current_user`.
    ///
    /// Returns the session and a receiver for [`ChatEvent`]s that the UI
    /// layer should consume.
    pub fn new<U: UserRepository + ?Sized>(
        current_user: User,
        roster: &U,
        repository: Arc<R>,
        config: &SessionConfig,
        rng: StdRng,
    ) -> (Self, mpsc::Receiver<ChatEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let ids = Arc::new(MessageIdAllocator::new());
        let rng = Arc::new(Mutex::new(rng));
        let online_probability = config.delivery.online_probability;

        let mut directory = Directory::new();
        directory.refresh(&current_user, roster, &mut *rng.lock(), online_probability);

        let simulator = DeliverySimulator::new(
            Arc::clone(&repository),
            Arc::clone(&ids),
            Arc::clone(&rng),
            config.delivery.clone(),
            config.retry,
            event_tx.clone(),
        );

        tracing::info!(
            user = %current_user.id,
            role = %current_user.role,
            conversations = directory.conversations().len(),
            "chat session opened"
        );

        let session = Self {
            current_user,
            directory,
            repository,
            ids,
            rng,
            simulator,
            view: ViewState::new(config.narrow_breakpoint, config.initial_width),
            retry: config.retry,
            online_probability,
            event_tx,
        };
        (session, event_rx)
    }

    /// The signed-in user.
    #[must_use]
    pub const fn current_user(&self) -> &User {
        &self.current_user
    }

    /// The conversation directory, in roster order.
    #[must_use]
    pub fn conversations(&self) -> &[Conversation] {
        self.directory.conversations()
    }

    /// Conversations whose name contains `term`, ignoring case.
    #[must_use]
    pub fn search(&self, term: &str) -> Vec<&Conversation> {
        directory::search(self.directory.conversations(), term)
    }

    /// Rebuild the directory if the roster changed since the last build.
    ///
    /// Returns `true` if it was rebuilt. The active conversation is kept
    /// even if its counterpart left the roster.
    pub fn refresh_directory<U: UserRepository + ?Sized>(&mut self, roster: &U) -> bool {
        self.directory.refresh(
            &self.current_user,
            roster,
            &mut *self.rng.lock(),
            self.online_probability,
        )
    }

    /// Current view state.
    #[must_use]
    pub const fn view(&self) -> &ViewState {
        &self.view
    }

    /// The active conversation, if any.
    #[must_use]
    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.view.active().and_then(|id| self.directory.get(id))
    }

    /// Make the conversation with `id` active.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::UnknownConversation`] if `id` is not in the
    /// directory, or [`ChatError::Store`] if the thread cannot be read.
    pub async fn select_conversation(&mut self, id: &UserId) -> Result<(), ChatError> {
        if self.directory.get(id).is_none() {
            return Err(ChatError::UnknownConversation(id.clone()));
        }
        let has_messages = !self.thread_with(id).await?.is_empty();
        self.view.select(id.clone(), has_messages);
        tracing::debug!(peer = %id, has_messages, "conversation selected");
        Ok(())
    }

    /// Messages of the active conversation, in log order.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Store`] if the thread cannot be read.
    pub async fn active_messages(&self) -> Result<Vec<Message>, ChatError> {
        match self.view.active() {
            Some(peer) => Ok(self.thread_with(peer).await?),
            None => Ok(Vec::new()),
        }
    }

    /// The first [`SHARED_FILES_LIMIT`] attachments of the active thread.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Store`] if the thread cannot be read.
    pub async fn shared_files(&self) -> Result<Vec<FileMeta>, ChatError> {
        Ok(self
            .active_messages()
            .await?
            .into_iter()
            .filter_map(|m| m.body.file().cloned())
            .take(SHARED_FILES_LIMIT)
            .collect())
    }

    /// Send `text` to the active conversation.
    ///
    /// Without an active conversation, or for whitespace-only text, nothing
    /// is appended or scheduled and [`SendOutcome::Skipped`] is returned.
    /// Transient store failures are retried per the session's
    /// [`RetryConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Validation`] for oversized text,
    /// [`ChatError::Store`] if the append fails for good, or
    /// [`ChatError::Closed`] after [`close`](Self::close).
    pub async fn send_text(&mut self, text: &str) -> Result<SendOutcome, ChatError> {
        self.ensure_open()?;
        let Some(peer) = self.view.active().cloned() else {
            return Ok(SendOutcome::Skipped(SkipReason::NoActiveConversation));
        };
        match Message::validate_text(text) {
            Ok(()) => {}
            Err(ValidationError::Empty) => {
                return Ok(SendOutcome::Skipped(SkipReason::EmptyMessage));
            }
            Err(e) => return Err(e.into()),
        }

        let first_in_thread = self.thread_with(&peer).await?.is_empty();
        let (id, timestamp) = self.ids.allocate();
        let message = Message {
            id,
            sender_id: self.current_user.id.clone(),
            receiver_id: peer.clone(),
            body: MessageBody::Text(text.to_string()),
            timestamp,
            read: false,
        };

        history::append_with_retry(self.repository.as_ref(), &message, self.retry).await?;
        tracing::debug!(message_id = %id, peer = %peer, first_in_thread, "message sent");
        let _ = self.event_tx.try_send(ChatEvent::MessageAppended {
            message: message.clone(),
        });

        if first_in_thread {
            self.view.first_message_sent();
        }
        let reply = self.simulator.schedule_reply(&message);
        Ok(SendOutcome::Sent { message, reply })
    }

    /// Start uploading `files` to the active conversation.
    ///
    /// Returns the new upload ids in input order; empty if no conversation
    /// is active.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Closed`] after [`close`](Self::close).
    pub fn attach_files(&mut self, files: Vec<FileHandle>) -> Result<Vec<UploadId>, ChatError> {
        self.ensure_open()?;
        let Some(peer) = self.view.active().cloned() else {
            tracing::debug!(files = files.len(), "attach ignored, no active conversation");
            return Ok(Vec::new());
        };
        Ok(files
            .into_iter()
            .map(|f| {
                self.simulator
                    .start_upload(f.into_meta(), self.current_user.id.clone(), peer.clone())
            })
            .collect())
    }

    /// Files were dropped onto the thread: hide the dropzone and upload them.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Closed`] after [`close`](Self::close).
    pub fn drop_files(&mut self, files: Vec<FileHandle>) -> Result<Vec<UploadId>, ChatError> {
        self.view.drag_leave();
        self.attach_files(files)
    }

    /// Files are being dragged over the thread.
    pub const fn drag_over(&mut self) {
        self.view.drag_over();
    }

    /// The drag left the thread.
    pub const fn drag_leave(&mut self) {
        self.view.drag_leave();
    }

    /// Cancel an in-flight upload.
    ///
    /// Returns `false` if it is not in flight or its message is already
    /// being stored.
    pub fn cancel_upload(&self, id: UploadId) -> bool {
        self.simulator.cancel_upload(id)
    }

    /// Uploads currently in flight, in start order.
    #[must_use]
    pub fn uploads(&self) -> Vec<UploadingFile> {
        self.simulator.uploads()
    }

    /// Return to the conversation list (narrow viewports only).
    pub fn back(&mut self) -> bool {
        self.view.back()
    }

    /// Show or hide the contact-detail panel.
    pub const fn toggle_profile(&mut self) {
        self.view.toggle_profile();
    }

    /// Apply a new viewport width. Returns `true` if narrowness changed.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Store`] if the active thread cannot be read.
    pub async fn resize(&mut self, width: u32) -> Result<bool, ChatError> {
        if !self.view.resize(width) {
            return Ok(false);
        }
        if let Some(peer) = self.view.active().cloned() {
            let has_messages = !self.thread_with(&peer).await?.is_empty();
            self.view.refresh_profile(has_messages);
        }
        tracing::debug!(width, narrow = self.view.is_narrow(), "viewport changed");
        Ok(true)
    }

    /// Cancel all pending replies and uploads. Further sends fail with
    /// [`ChatError::Closed`].
    pub fn close(&self) {
        if !self.simulator.is_shut_down() {
            tracing::info!(user = %self.current_user.id, "chat session closed");
        }
        self.simulator.shutdown();
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.simulator.is_shut_down()
    }

    fn ensure_open(&self) -> Result<(), ChatError> {
        if self.is_closed() {
            return Err(ChatError::Closed);
        }
        Ok(())
    }

    async fn thread_with(&self, peer: &UserId) -> Result<Vec<Message>, StoreError> {
        self.repository.for_pair(&self.current_user.id, peer).await
    }
}
