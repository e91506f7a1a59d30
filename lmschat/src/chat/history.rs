//! Message log storage.
//!
//! The log is append-only for the lifetime of a session: [`MessageRepository::append`]
//! is the only mutator, nothing is ever edited or removed, and appends are not
//! deduplicated. A conversation thread is the subsequence of the log whose
//! unordered {sender, receiver} pair matches, in insertion order
//! ([`messages_for_pair`]).

use parking_lot::Mutex;

use lmschat_proto::message::{Message, MessageBody, MessageId, Timestamp};
use lmschat_proto::user::UserId;

use crate::config::RetryConfig;

/// Errors that can occur during message storage operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The underlying storage is temporarily unavailable. Worth retrying.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A write operation failed permanently.
    #[error("write failed: {0}")]
    WriteFailed(String),
}

impl StoreError {
    /// Returns `true` if the operation may succeed when retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Storage backend for the message log.
///
/// Implementations must serialise appends so that the log order is the
/// order in which `append` calls completed.
pub trait MessageRepository: Send + Sync {
    /// Append a message to the end of the log.
    fn append(
        &self,
        message: Message,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Messages exchanged between `a` and `b`, in log order.
    fn for_pair(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, StoreError>> + Send;

    /// Total number of messages in the log.
    fn count(&self) -> impl std::future::Future<Output = Result<usize, StoreError>> + Send;
}

/// Select the messages of `log` exchanged between `a` and `b`.
///
/// Pure function of its inputs: the result is exactly the subsequence of
/// `log` whose unordered {sender, receiver} pair equals {a, b}, in the
/// original order.
#[must_use]
pub fn messages_for_pair(log: &[Message], a: &UserId, b: &UserId) -> Vec<Message> {
    log.iter().filter(|m| m.is_between(a, b)).cloned().collect()
}

/// Append `message`, retrying transient store errors with a doubling backoff.
///
/// Permanent errors, and the last transient one once `retry.send_retries`
/// retries are spent, are returned as is.
///
/// # Errors
///
/// Returns the [`StoreError`] of the final attempt.
pub async fn append_with_retry<R: MessageRepository + ?Sized>(
    repository: &R,
    message: &Message,
    retry: RetryConfig,
) -> Result<(), StoreError> {
    let mut backoff = retry.backoff;
    let mut attempt = 0;
    loop {
        match repository.append(message.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() && attempt < retry.send_retries => {
                tracing::debug!(
                    message_id = %message.id,
                    attempt,
                    max_retries = retry.send_retries,
                    error = %e,
                    "append failed, will retry"
                );
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => {
                tracing::warn!(message_id = %message.id, error = %e, "append failed");
                return Err(e);
            }
        }
    }
}

/// Return a copy of `log` with `message` appended.
#[must_use]
pub fn append(log: &[Message], message: Message) -> Vec<Message> {
    let mut next = Vec::with_capacity(log.len() + 1);
    next.extend_from_slice(log);
    next.push(message);
    next
}

/// Allocates message identifiers and timestamps from the wall clock.
///
/// Identifiers are strictly increasing (`max(now_ms, last + 1)`), and
/// timestamps never go backwards even if the system clock does.
#[derive(Debug, Default)]
pub struct MessageIdAllocator {
    last: Mutex<(u64, u64)>,
}

impl MessageIdAllocator {
    /// Create a new allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next identifier and creation timestamp.
    pub fn allocate(&self) -> (MessageId, Timestamp) {
        let now = Timestamp::now().as_millis();
        let mut last = self.last.lock();
        let id = now.max(last.0.saturating_add(1));
        let ts = now.max(last.1);
        *last = (id, ts);
        drop(last);
        (MessageId::new(id), Timestamp::from_millis(ts))
    }
}

/// The sample thread shown to the demo student account.
///
/// Timestamps are relative to `now`; ids are small integers, which never
/// collide with wall-clock ids handed out by [`MessageIdAllocator`].
#[must_use]
pub fn seed_messages(now: Timestamp) -> Vec<Message> {
    const HOUR: u64 = 60 * 60 * 1000;
    let text = |id: u64, from: &str, to: &str, body: &str, ago: u64| Message {
        id: MessageId::new(id),
        sender_id: UserId::new(from),
        receiver_id: UserId::new(to),
        body: MessageBody::Text(body.to_string()),
        timestamp: now.saturating_sub_millis(ago),
        read: true,
    };
    vec![
        text(
            1,
            "1",
            "student-1",
            "Hello! How can I help you with the assignment?",
            2 * HOUR,
        ),
        text(
            2,
            "student-1",
            "1",
            "Hi Dr. Jaoko, I have a question about question 3.",
            3 * HOUR / 2,
        ),
        text(
            3,
            "1",
            "student-1",
            "Sure! What specific part are you having trouble with?",
            HOUR,
        ),
        text(
            4,
            "3",
            "student-1",
            "Your account has been successfully updated.",
            3 * HOUR,
        ),
    ]
}

/// In-memory message log.
///
/// Not persistent: all data is lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryMessageLog {
    messages: Mutex<Vec<Message>>,
}

impl InMemoryMessageLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log pre-populated with `messages`, in the given order.
    #[must_use]
    pub const fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages: Mutex::new(messages),
        }
    }

    /// A copy of the whole log.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }
}

impl MessageRepository for InMemoryMessageLog {
    async fn append(&self, message: Message) -> Result<(), StoreError> {
        self.messages.lock().push(message);
        Ok(())
    }

    async fn for_pair(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>, StoreError> {
        Ok(messages_for_pair(&self.messages.lock(), a, b))
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.messages.lock().len())
    }
}
