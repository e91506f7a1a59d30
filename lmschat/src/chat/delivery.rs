//! Simulated delivery: synthetic replies and file uploads.
//!
//! Two state machines run as independent tokio tasks:
//!
//! - **Reply**: `Sent -> coin flip -> NoReply | ReplyScheduled(delay) -> ReplyDelivered`.
//!   The reply is authored by the counterpart, marked read, and appended
//!   to the message log.
//! - **Upload**: `Selected -> UploadTicking -> MessageAppended -> UploadComplete
//!   -> AckScheduled -> AckDelivered`. Progress advances on a fixed tick;
//!   completion happens at a fixed deadline regardless of how many ticks ran.
//!   The upload stays in flight until its message is stored, and ends as
//!   `Failed` if the store gives up.
//!
//! Appends go through the same transient-error retry as outgoing text.
//!
//! Every task holds a child of the simulator's shutdown token, so closing
//! the owning session stops all pending timers before they can touch the
//! log.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use rand::rngs::StdRng;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use lmschat_proto::message::{FileMeta, Message, MessageBody, MessageId};
use lmschat_proto::upload::{UploadId, UploadState, UploadingFile};
use lmschat_proto::user::UserId;

use crate::config::{DeliveryConfig, RetryConfig, probability};

use super::ChatEvent;
use super::history::{self, MessageIdAllocator, MessageRepository, StoreError};

/// Canned replies a counterpart picks from.
pub const REPLY_CORPUS: [&str; 35] = [
    "Thanks for your message!",
    "I'll get back to you soon.",
    "That's a great question!",
    "Let me check that for you.",
    "Can we discuss this in our next class?",
    "I appreciate your enthusiasm!",
    "Good point! Let me think about it.",
    "I understand your concern.",
    "That's an interesting perspective.",
    "Let me look into that and get back to you.",
    "I'm glad you asked about that.",
    "That's definitely something we should cover.",
    "I'll make a note of that for our next session.",
    "Thanks for bringing that to my attention.",
    "I see what you mean.",
    "That's a valid point.",
    "Let me double-check the material on that.",
    "I'm here to help with any questions.",
    "That's a common question students have.",
    "I'll provide more details on that topic.",
    "Great observation!",
    "I'll clarify that in our next meeting.",
    "Thanks for your patience.",
    "I'm working on getting that information for you.",
    "That's an important aspect to consider.",
    "I'll review that and give you a proper answer.",
    "Thanks for being so engaged!",
    "I'll research that and update you.",
    "That's a thoughtful question.",
    "Let me consult the course materials.",
    "I appreciate you asking for clarification.",
    "I'll make sure to address that properly.",
    "That's a key concept we're covering.",
    "I'll get back to you with more details soon.",
    "Thanks for your curiosity about this topic.",
];

/// Text of the acknowledgment sent after a file upload.
#[must_use]
pub fn upload_ack_text(file_name: &str) -> String {
    format!("Thanks for sharing the file \"{file_name}\"!")
}

/// Outcome of the reply coin flip for an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyDecision {
    /// The counterpart stays silent.
    NoReply,
    /// A reply will be appended after `delay`.
    Scheduled {
        /// Time until the reply is delivered.
        delay: Duration,
        /// The reply text.
        text: String,
    },
}

/// State shared between the simulator and its spawned tasks.
struct Shared<R> {
    repository: Arc<R>,
    ids: Arc<MessageIdAllocator>,
    uploads: Mutex<Vec<UploadingFile>>,
    upload_tokens: Mutex<HashMap<UploadId, CancellationToken>>,
    retry: RetryConfig,
    event_tx: mpsc::Sender<ChatEvent>,
}

impl<R: MessageRepository> Shared<R> {
    /// Store `message`, retrying transient failures.
    async fn store(&self, message: &Message) -> Result<(), StoreError> {
        history::append_with_retry(self.repository.as_ref(), message, self.retry).await
    }

    /// Store `message` and announce it.
    async fn deliver(&self, message: Message) -> Result<(), StoreError> {
        self.store(&message).await?;
        let _ = self.event_tx.try_send(ChatEvent::MessageAppended { message });
        Ok(())
    }

    /// Take an upload past the point of cancellation.
    ///
    /// Returns `None` if its token was cancelled first. The check and the
    /// token removal happen under the same lock as [`DeliverySimulator::cancel_upload`],
    /// so a cancel either wins here or reports `false`.
    fn claim(&self, id: UploadId, token: &CancellationToken) -> Option<UploadingFile> {
        {
            let mut tokens = self.upload_tokens.lock();
            if token.is_cancelled() {
                return None;
            }
            tokens.remove(&id);
        }
        self.uploads.lock().iter().find(|u| u.id == id).cloned()
    }

    /// Advance an upload by `step` and return its new progress.
    fn advance(&self, id: UploadId, step: u8) -> Option<u8> {
        self.uploads
            .lock()
            .iter_mut()
            .find(|u| u.id == id)
            .map(|u| u.advance(step))
    }

    /// Move an upload into a terminal state and drop it from the in-flight set.
    fn finish(&self, id: UploadId, state: UploadState) -> Option<UploadingFile> {
        self.upload_tokens.lock().remove(&id);
        let mut uploads = self.uploads.lock();
        let index = uploads.iter().position(|u| u.id == id)?;
        let mut upload = uploads.remove(index);
        drop(uploads);
        if state == UploadState::Complete {
            upload.complete();
        } else {
            upload.state = state;
        }
        Some(upload)
    }

    fn cancelled(&self, id: UploadId) {
        if self.finish(id, UploadState::Cancelled).is_some() {
            tracing::info!(upload = %id, "upload cancelled");
            let _ = self.event_tx.try_send(ChatEvent::UploadCancelled { id });
        }
    }
}

/// Schedules synthetic replies and simulated uploads.
pub struct DeliverySimulator<R: MessageRepository + 'static> {
    shared: Arc<Shared<R>>,
    rng: Arc<Mutex<StdRng>>,
    config: DeliveryConfig,
    shutdown: CancellationToken,
}

impl<R: MessageRepository + 'static> DeliverySimulator<R> {
    /// Create a simulator that appends to `repository` and reports on `event_tx`.
    pub fn new(
        repository: Arc<R>,
        ids: Arc<MessageIdAllocator>,
        rng: Arc<Mutex<StdRng>>,
        config: DeliveryConfig,
        retry: RetryConfig,
        event_tx: mpsc::Sender<ChatEvent>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                repository,
                ids,
                uploads: Mutex::new(Vec::new()),
                upload_tokens: Mutex::new(HashMap::new()),
                retry,
                event_tx,
            }),
            rng,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Flip the reply coin for `trigger` and, on heads, schedule a reply
    /// from its receiver.
    ///
    /// The reply text is drawn here rather than at delivery time so that a
    /// seeded rng yields the same transcript regardless of task interleaving.
    pub fn schedule_reply(&self, trigger: &Message) -> ReplyDecision {
        let decision = {
            let mut rng = self.rng.lock();
            if rng.random_bool(probability(self.config.reply_probability)) {
                let delay = draw_delay(
                    &mut rng,
                    self.config.reply_delay_min,
                    self.config.reply_delay_max,
                );
                let text = REPLY_CORPUS[rng.random_range(0..REPLY_CORPUS.len())].to_string();
                ReplyDecision::Scheduled { delay, text }
            } else {
                ReplyDecision::NoReply
            }
        };

        let ReplyDecision::Scheduled { delay, ref text } = decision else {
            tracing::debug!(trigger = %trigger.id, "no reply for message");
            return decision;
        };

        tracing::debug!(
            trigger = %trigger.id,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "reply scheduled"
        );
        let _ = self.shared.event_tx.try_send(ChatEvent::ReplyScheduled {
            trigger: trigger.id,
            delay,
        });

        let shared = Arc::clone(&self.shared);
        let token = self.shutdown.child_token();
        let from = trigger.receiver_id.clone();
        let to = trigger.sender_id.clone();
        let not_before = trigger.timestamp;
        let text = text.clone();
        let trigger_id = trigger.id;
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {
                    tracing::debug!(trigger = %trigger_id, "pending reply cancelled");
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }
            let (id, timestamp) = shared.ids.allocate();
            let reply = Message {
                id,
                sender_id: from,
                receiver_id: to,
                body: MessageBody::Text(text),
                timestamp: timestamp.max(not_before),
                read: true,
            };
            if let Err(e) = shared.deliver(reply).await {
                tracing::warn!(trigger = %trigger_id, error = %e, "failed to append reply");
            }
        });

        decision
    }

    /// Start a simulated upload of `file` from `sender` to `receiver`.
    ///
    /// Returns immediately; progress, completion and the counterpart's
    /// acknowledgment are reported as [`ChatEvent`]s.
    pub fn start_upload(&self, file: FileMeta, sender: UserId, receiver: UserId) -> UploadId {
        let upload = UploadingFile::start(file, sender, receiver);
        let id = upload.id;
        let token = self.shutdown.child_token();

        self.shared.uploads.lock().push(upload.clone());
        self.shared.upload_tokens.lock().insert(id, token.clone());

        tracing::debug!(upload = %id, file = %upload.file.name, size = upload.file.size, "upload started");
        let _ = self
            .shared
            .event_tx
            .try_send(ChatEvent::UploadStarted { upload });

        tokio::spawn(run_upload(
            Arc::clone(&self.shared),
            self.config.clone(),
            id,
            token,
        ));
        id
    }

    /// Cancel an in-flight upload.
    ///
    /// Returns `false` if the upload is unknown or has already reached its
    /// deadline and is being stored.
    pub fn cancel_upload(&self, id: UploadId) -> bool {
        let tokens = self.shared.upload_tokens.lock();
        let Some(token) = tokens.get(&id) else {
            return false;
        };
        token.cancel();
        true
    }

    /// Snapshot of the uploads currently in flight, in start order.
    #[must_use]
    pub fn uploads(&self) -> Vec<UploadingFile> {
        self.shared.uploads.lock().clone()
    }

    /// Cancel every pending reply and upload.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl<R: MessageRepository + 'static> Drop for DeliverySimulator<R> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn draw_delay(rng: &mut StdRng, min: Duration, max: Duration) -> Duration {
    let lo = u64::try_from(min.as_millis()).unwrap_or(u64::MAX);
    let hi = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if hi <= lo {
        return min;
    }
    Duration::from_millis(rng.random_range(lo..hi))
}

async fn run_upload<R: MessageRepository>(
    shared: Arc<Shared<R>>,
    config: DeliveryConfig,
    id: UploadId,
    token: CancellationToken,
) {
    let tick = config.upload_tick.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + tick, tick);
    let deadline = tokio::time::sleep(config.upload_duration);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                shared.cancelled(id);
                return;
            }
            () = &mut deadline => break,
            _ = ticker.tick() => {
                if let Some(progress) = shared.advance(id, config.upload_step) {
                    let _ = shared.event_tx.try_send(ChatEvent::UploadProgress { id, progress });
                }
            }
        }
    }

    let Some(upload) = shared.claim(id, &token) else {
        shared.cancelled(id);
        return;
    };

    let (message_id, timestamp) = shared.ids.allocate();
    let message = Message {
        id: message_id,
        sender_id: upload.sender_id.clone(),
        receiver_id: upload.receiver_id.clone(),
        body: MessageBody::attachment(upload.file.clone()),
        timestamp,
        read: false,
    };
    if let Err(e) = shared.store(&message).await {
        tracing::warn!(upload = %id, error = %e, "upload finished but message could not be stored");
        let reason = e.to_string();
        shared.finish(id, UploadState::Failed(reason.clone()));
        let _ = shared.event_tx.try_send(ChatEvent::UploadFailed { id, reason });
        return;
    }

    let Some(upload) = shared.finish(id, UploadState::Complete) else {
        return;
    };
    let _ = shared.event_tx.try_send(ChatEvent::UploadProgress {
        id,
        progress: upload.progress,
    });
    let _ = shared.event_tx.try_send(ChatEvent::MessageAppended { message });
    tracing::info!(upload = %id, file = %upload.file.name, message_id = %message_id, "upload complete");
    let _ = shared
        .event_tx
        .try_send(ChatEvent::UploadCompleted { id, message_id });

    acknowledge(&shared, &config, &upload, message_id, &token).await;
}

async fn acknowledge<R: MessageRepository>(
    shared: &Shared<R>,
    config: &DeliveryConfig,
    upload: &UploadingFile,
    message_id: MessageId,
    token: &CancellationToken,
) {
    tokio::select! {
        () = token.cancelled() => return,
        () = tokio::time::sleep(config.ack_delay) => {}
    }
    let (id, timestamp) = shared.ids.allocate();
    let ack = Message {
        id,
        sender_id: upload.receiver_id.clone(),
        receiver_id: upload.sender_id.clone(),
        body: MessageBody::Text(upload_ack_text(&upload.file.name)),
        timestamp,
        read: true,
    };
    if let Err(e) = shared.deliver(ack).await {
        tracing::warn!(message_id = %message_id, error = %e, "failed to append upload acknowledgment");
    }
}
