//! Integration tests for simulated file uploads.
//!
//! Covers:
//! 1. A 2 MB PDF ticks 0..100, becomes a file message at ~1 s, and is
//!    acknowledged ~1.5 s later.
//! 2. Images become image messages; concurrent uploads are independent.
//! 3. Cancellation (single upload or whole session) leaves the log untouched.
//! 4. A store failure at completion surfaces as `UploadFailed` and never
//!    reports full progress.
//! 5. With a slow store, the upload stays in flight until its message lands.

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc;
use tokio::time::Instant;

use lmschat::chat::delivery::upload_ack_text;
use lmschat::chat::history::{InMemoryMessageLog, MessageRepository, StoreError};
use lmschat::chat::{ChatEvent, ChatSession};
use lmschat::config::SessionConfig;
use lmschat::directory::StaticRoster;
use lmschat::files::FileHandle;
use lmschat_proto::message::{Message, MessageKind};
use lmschat_proto::upload::UploadState;
use lmschat_proto::user::{Role, User, UserId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn person(id: &str, role: Role) -> User {
    User {
        id: UserId::new(id),
        name: format!("User {id}"),
        email: format!("{id}@lms.test"),
        role,
        profile_pic: None,
        online: false,
        last_seen: None,
    }
}

fn roster() -> StaticRoster {
    StaticRoster::new(vec![
        person("u1", Role::Student),
        person("u2", Role::Teacher),
    ])
    .unwrap()
}

fn quiet() -> SessionConfig {
    let mut config = SessionConfig::default();
    config.delivery.reply_probability = 0.0;
    config
}

async fn open<R: MessageRepository + 'static>(
    repository: R,
) -> (ChatSession<R>, mpsc::Receiver<ChatEvent>, Arc<R>) {
    let repository = Arc::new(repository);
    let (mut session, events) = ChatSession::new(
        person("u1", Role::Student),
        &roster(),
        Arc::clone(&repository),
        &quiet(),
        StdRng::seed_from_u64(1),
    );
    session.select_conversation(&UserId::new("u2")).await.unwrap();
    (session, events, repository)
}

fn notes_pdf() -> FileHandle {
    FileHandle::new(
        "notes.pdf",
        2 * 1024 * 1024,
        "application/pdf",
        "file:///home/una/notes.pdf",
    )
}

/// Store whose appends always fail.
struct BrokenLog;

impl MessageRepository for BrokenLog {
    async fn append(&self, _message: Message) -> Result<(), StoreError> {
        Err(StoreError::WriteFailed("read-only volume".into()))
    }

    async fn for_pair(&self, _a: &UserId, _b: &UserId) -> Result<Vec<Message>, StoreError> {
        Ok(Vec::new())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

/// In-memory store whose appends take `delay`.
struct SlowLog {
    inner: InMemoryMessageLog,
    delay: Duration,
}

impl MessageRepository for SlowLog {
    async fn append(&self, message: Message) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.append(message).await
    }

    async fn for_pair(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>, StoreError> {
        self.inner.for_pair(a, b).await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.inner.count().await
    }
}

// ---------------------------------------------------------------------------
// Upload lifecycle
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn pdf_upload_ticks_completes_and_is_acknowledged() {
    let (mut session, mut events, log) = open(InMemoryMessageLog::new()).await;
    let start = Instant::now();
    let ids = session.attach_files(vec![notes_pdf()]).unwrap();
    assert_eq!(ids.len(), 1);
    let id = ids[0];

    let in_flight = session.uploads();
    assert_eq!(in_flight.len(), 1);
    assert_eq!(in_flight[0].progress, 0);
    assert_eq!(in_flight[0].state, UploadState::Ticking);

    let mut progress = Vec::new();
    let mut completed_at = None;
    let mut file_message = None;
    let mut ack = None;
    while let Some(event) = events.recv().await {
        match event {
            ChatEvent::UploadStarted { upload } => assert_eq!(upload.id, id),
            ChatEvent::UploadProgress { id: p, progress: value } if p == id => {
                assert!(file_message.is_none(), "progress after completion");
                progress.push(value);
            }
            ChatEvent::MessageAppended { message } if message.sender_id == UserId::new("u1") => {
                completed_at = Some(start.elapsed());
                file_message = Some(message);
            }
            ChatEvent::MessageAppended { message } => {
                ack = Some((start.elapsed(), message));
                break;
            }
            _ => {}
        }
    }

    let mut distinct = progress.clone();
    distinct.dedup();
    assert_eq!(distinct, (1..=10).map(|n| n * 10).collect::<Vec<u8>>());
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));

    let completed_at = completed_at.unwrap();
    assert!(completed_at >= Duration::from_millis(1000));
    assert!(completed_at < Duration::from_millis(1100));

    let file_message = file_message.unwrap();
    assert_eq!(file_message.kind(), MessageKind::File);
    let meta = file_message.body.file().unwrap();
    assert_eq!(meta.name, "notes.pdf");
    assert_eq!(meta.size, 2_097_152);
    assert!(!file_message.read);

    let (ack_at, ack) = ack.unwrap();
    assert!(ack_at >= completed_at + Duration::from_millis(1500));
    assert_eq!(ack.sender_id, UserId::new("u2"));
    assert_eq!(ack.body.text(), Some(upload_ack_text("notes.pdf").as_str()));
    assert!(ack.body.text().unwrap().contains("notes.pdf"));
    assert!(ack.read);

    assert!(session.uploads().is_empty());
    assert_eq!(log.count().await.unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn slow_store_keeps_upload_in_flight_until_appended() {
    let (mut session, mut events, log) = open(SlowLog {
        inner: InMemoryMessageLog::new(),
        delay: Duration::from_millis(50),
    })
    .await;
    let id = session.attach_files(vec![notes_pdf()]).unwrap()[0];

    // Past the deadline, while the append is still pending.
    tokio::time::sleep(Duration::from_millis(1020)).await;
    assert_eq!(log.count().await.unwrap(), 0);
    let in_flight = session.uploads();
    assert_eq!(in_flight.len(), 1);
    assert_eq!(in_flight[0].id, id);
    assert_eq!(in_flight[0].state, UploadState::Ticking);
    assert!(!session.cancel_upload(id));

    let mut last_progress = None;
    while let Ok(event) = events.try_recv() {
        if let ChatEvent::UploadProgress { progress, .. } = event {
            last_progress = Some(progress);
        }
    }
    assert!(last_progress.is_some_and(|p| p < 100));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(log.count().await.unwrap(), 1);
    assert!(session.uploads().is_empty());

    let mut full = false;
    let mut completed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            ChatEvent::UploadProgress { progress: 100, .. } => full = true,
            ChatEvent::UploadCompleted { id: c, .. } if c == id => {
                assert!(full, "completed before reporting full progress");
                completed = true;
            }
            _ => {}
        }
    }
    assert!(completed);
    session.close();
}

#[tokio::test(start_paused = true)]
async fn image_upload_becomes_image_message() {
    let (mut session, _events, log) = open(InMemoryMessageLog::new()).await;
    session
        .attach_files(vec![FileHandle::new(
            "diagram.png",
            4096,
            "image/png",
            "file:///home/una/diagram.png",
        )])
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let snapshot = log.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].kind(), MessageKind::Image);
}

#[tokio::test(start_paused = true)]
async fn concurrent_uploads_each_append_once() {
    let (mut session, _events, log) = open(InMemoryMessageLog::new()).await;
    session
        .attach_files(vec![
            notes_pdf(),
            FileHandle::new("slides.pptx", 10, "application/vnd.ms-powerpoint", "file:///s"),
        ])
        .unwrap();
    assert_eq!(session.uploads().len(), 2);

    tokio::time::sleep(Duration::from_secs(3)).await;
    let snapshot = log.snapshot();
    let files: Vec<&str> = snapshot
        .iter()
        .filter_map(|m| m.body.file().map(|f| f.name.as_str()))
        .collect();
    assert_eq!(files.len(), 2);
    assert!(files.contains(&"notes.pdf") && files.contains(&"slides.pptx"));
    let acks = snapshot.iter().filter(|m| m.read).count();
    assert_eq!(acks, 2);
    assert!(session.uploads().is_empty());

    let shared = session.shared_files().await.unwrap();
    assert_eq!(shared.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn attach_without_conversation_does_nothing() {
    let (mut session, _events) = ChatSession::new(
        person("u1", Role::Student),
        &roster(),
        Arc::new(InMemoryMessageLog::new()),
        &quiet(),
        StdRng::seed_from_u64(1),
    );
    assert!(session.attach_files(vec![notes_pdf()]).unwrap().is_empty());
    assert!(session.uploads().is_empty());
}

// ---------------------------------------------------------------------------
// Cancellation and failure
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn cancelled_upload_appends_nothing() {
    let (mut session, mut events, log) = open(InMemoryMessageLog::new()).await;
    let id = session.attach_files(vec![notes_pdf()]).unwrap()[0];

    tokio::time::sleep(Duration::from_millis(450)).await;
    assert!(session.cancel_upload(id));
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(log.count().await.unwrap(), 0);
    assert!(session.uploads().is_empty());

    let mut cancelled = false;
    while let Ok(event) = events.try_recv() {
        match event {
            ChatEvent::UploadCancelled { id: c } if c == id => cancelled = true,
            ChatEvent::UploadCompleted { .. } => panic!("cancelled upload completed"),
            _ => {}
        }
    }
    assert!(cancelled);
}

#[tokio::test(start_paused = true)]
async fn closing_session_stops_uploads_and_acks() {
    let (mut session, _events, log) = open(InMemoryMessageLog::new()).await;
    session.attach_files(vec![notes_pdf()]).unwrap();

    // Past completion, before the acknowledgment.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(log.count().await.unwrap(), 1);
    session.close();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(log.count().await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn store_failure_reports_upload_failed() {
    let (mut session, mut events, _log) = open(BrokenLog).await;
    let id = session.attach_files(vec![notes_pdf()]).unwrap()[0];

    let mut failed = None;
    while let Some(event) = events.recv().await {
        match event {
            ChatEvent::UploadFailed { id: f, reason } if f == id => {
                failed = Some(reason);
                break;
            }
            ChatEvent::UploadCompleted { .. } => panic!("failed upload reported as completed"),
            ChatEvent::UploadProgress { progress: 100, .. } => {
                panic!("failed upload reported full progress");
            }
            ChatEvent::MessageAppended { .. } => panic!("failed upload announced a message"),
            _ => {}
        }
    }
    assert!(failed.unwrap().contains("read-only volume"));
    assert!(session.uploads().is_empty());
}

#[tokio::test]
async fn dropped_files_hide_dropzone_and_upload() {
    let (mut session, _events, _log) = open(InMemoryMessageLog::new()).await;
    session.drag_over();
    assert!(session.view().dropzone_visible());

    let ids = session.drop_files(vec![notes_pdf()]).unwrap();
    assert_eq!(ids.len(), 1);
    assert!(!session.view().dropzone_visible());
    session.close();
}

#[tokio::test]
async fn local_file_can_be_attached() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("essay.txt");
    std::fs::write(&path, "Lorem ipsum").unwrap();

    let handle = FileHandle::from_path(&path).await.unwrap();
    assert_eq!(handle.size, 11);
    assert_eq!(handle.media_type, "text/plain");

    let (mut session, _events, _log) = open(InMemoryMessageLog::new()).await;
    let ids = session.attach_files(vec![handle]).unwrap();
    assert_eq!(session.uploads()[0].id, ids[0]);
    assert_eq!(session.uploads()[0].file.name, "essay.txt");
    session.close();
}
