//! Integration tests for layout coordination through a `ChatSession`.
//!
//! Covers:
//! 1. Narrowing the viewport with an active conversation hides the list,
//!    and back returns to it with the selection cleared.
//! 2. The contact panel opens automatically only on wide viewports with a
//!    non-empty thread, and the rule is re-applied when the viewport widens.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;

use lmschat::chat::ChatSession;
use lmschat::chat::history::{InMemoryMessageLog, seed_messages};
use lmschat::config::SessionConfig;
use lmschat::directory::{StaticRoster, UserRepository};
use lmschat::view::Panes;
use lmschat_proto::message::Timestamp;
use lmschat_proto::user::UserId;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Demo student with the seeded thread, at the given viewport width.
fn open(width: u32) -> ChatSession<InMemoryMessageLog> {
    let roster = StaticRoster::demo();
    let student = roster.find(&UserId::new("student-1")).unwrap();
    let mut config = SessionConfig::default();
    config.delivery.reply_probability = 0.0;
    config.initial_width = width;
    let (session, _events) = ChatSession::new(
        student,
        &roster,
        Arc::new(InMemoryMessageLog::with_messages(seed_messages(
            Timestamp::now(),
        ))),
        &config,
        StdRng::seed_from_u64(0),
    );
    session
}

const WIDE: u32 = 1280;
const NARROW: u32 = 375;

// ---------------------------------------------------------------------------
// Narrow and wide layouts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn narrowing_with_active_conversation_shows_thread_only() {
    let mut session = open(WIDE);
    session.select_conversation(&UserId::new("2")).await.unwrap();
    assert_eq!(
        session.view().panes(),
        Panes {
            list: true,
            thread: true,
            profile: false
        }
    );

    assert!(session.resize(700).await.unwrap());
    let panes = session.view().panes();
    assert!(!panes.list);
    assert!(panes.thread);

    assert!(session.back());
    assert!(session.view().active().is_none());
    assert!(session.active_conversation().is_none());
    let panes = session.view().panes();
    assert!(panes.list);
    assert!(!panes.thread);
}

#[tokio::test]
async fn back_on_wide_keeps_selection() {
    let mut session = open(WIDE);
    session.select_conversation(&UserId::new("1")).await.unwrap();
    assert!(!session.back());
    assert_eq!(
        session.active_conversation().map(|c| c.name.as_str()),
        Some("Dr. Mary Jaoko")
    );
}

#[tokio::test]
async fn resize_within_same_class_is_not_a_change() {
    let mut session = open(WIDE);
    assert!(!session.resize(1024).await.unwrap());
    assert!(!session.resize(769).await.unwrap());
    assert!(session.resize(768).await.unwrap());
    assert!(session.view().is_narrow());
}

// ---------------------------------------------------------------------------
// Contact panel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn existing_thread_opens_profile_on_wide_only() {
    let mut wide = open(WIDE);
    wide.select_conversation(&UserId::new("1")).await.unwrap();
    assert!(wide.view().profile_visible());

    let mut narrow = open(NARROW);
    narrow.select_conversation(&UserId::new("1")).await.unwrap();
    assert!(!narrow.view().profile_visible());
    assert!(!narrow.view().panes().list);
}

#[tokio::test]
async fn widening_reapplies_profile_rule() {
    let mut session = open(NARROW);
    session.select_conversation(&UserId::new("3")).await.unwrap();
    assert!(!session.view().profile_visible());

    assert!(session.resize(WIDE).await.unwrap());
    assert!(session.view().profile_visible());
}

#[tokio::test]
async fn widening_with_empty_thread_keeps_profile_closed() {
    let mut session = open(NARROW);
    session.select_conversation(&UserId::new("2")).await.unwrap();
    assert!(session.resize(WIDE).await.unwrap());
    assert!(!session.view().profile_visible());
}

#[tokio::test]
async fn toggle_profile_flips_panel() {
    let mut session = open(WIDE);
    session.toggle_profile();
    assert!(!session.view().profile_visible());

    session.select_conversation(&UserId::new("2")).await.unwrap();
    session.toggle_profile();
    assert!(session.view().panes().profile);
    session.toggle_profile();
    assert!(!session.view().panes().profile);
}

#[tokio::test]
async fn drag_leave_hides_dropzone() {
    let mut session = open(WIDE);
    session.drag_over();
    assert!(session.view().dropzone_visible());
    session.drag_leave();
    assert!(!session.view().dropzone_visible());
}
