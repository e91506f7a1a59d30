//! View-state coordination across narrow and wide layouts.
//!
//! On a wide viewport the conversation list and the active thread are shown
//! side by side. On a narrow viewport exactly one of them is visible: the
//! thread when a conversation is active, the list otherwise.

use lmschat_proto::user::UserId;

/// Widths at or below this many pixels are narrow.
pub const NARROW_BREAKPOINT: u32 = 768;

/// Which panes are visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Panes {
    /// Conversation list.
    pub list: bool,
    /// Active thread (or the empty-state placeholder on wide layouts).
    pub thread: bool,
    /// Contact-detail panel.
    pub profile: bool,
}

/// Tracks the active conversation and which panels and overlays are shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    active: Option<UserId>,
    profile_visible: bool,
    narrow: bool,
    dropzone_visible: bool,
    breakpoint: u32,
}

impl ViewState {
    /// Create a view state for a viewport `width` pixels wide.
    #[must_use]
    pub const fn new(breakpoint: u32, width: u32) -> Self {
        Self {
            active: None,
            profile_visible: false,
            narrow: width <= breakpoint,
            dropzone_visible: false,
            breakpoint,
        }
    }

    /// The active conversation's counterpart id.
    #[must_use]
    pub const fn active(&self) -> Option<&UserId> {
        self.active.as_ref()
    }

    /// Whether the contact-detail panel is shown.
    #[must_use]
    pub const fn profile_visible(&self) -> bool {
        self.profile_visible
    }

    /// Whether the viewport is narrow.
    #[must_use]
    pub const fn is_narrow(&self) -> bool {
        self.narrow
    }

    /// Whether the drag-and-drop overlay is shown.
    #[must_use]
    pub const fn dropzone_visible(&self) -> bool {
        self.dropzone_visible
    }

    /// Make `id` the active conversation.
    ///
    /// Opens the contact-detail panel if the thread already has messages and
    /// the viewport is wide. An empty thread leaves the panel as it was.
    pub fn select(&mut self, id: UserId, thread_has_messages: bool) {
        self.active = Some(id);
        self.show_profile_if(thread_has_messages);
    }

    /// The first message of an empty thread was sent.
    pub fn first_message_sent(&mut self) {
        self.show_profile_if(true);
    }

    /// Apply a new viewport width. Returns `true` if narrowness changed.
    ///
    /// After a change the caller should call
    /// [`refresh_profile`](Self::refresh_profile) with the active thread's
    /// state, mirroring the selection rule.
    pub const fn resize(&mut self, width: u32) -> bool {
        let narrow = width <= self.breakpoint;
        let changed = narrow != self.narrow;
        self.narrow = narrow;
        changed
    }

    /// Re-apply the selection rule for the current conversation.
    pub fn refresh_profile(&mut self, thread_has_messages: bool) {
        self.show_profile_if(thread_has_messages);
    }

    /// Return to the conversation list. Only meaningful on narrow viewports;
    /// returns `false` (and does nothing) on wide ones.
    pub fn back(&mut self) -> bool {
        if !self.narrow {
            return false;
        }
        self.active = None;
        self.profile_visible = false;
        true
    }

    /// Flip the contact-detail panel. No-op without an active conversation.
    pub const fn toggle_profile(&mut self) {
        if self.active.is_some() {
            self.profile_visible = !self.profile_visible;
        }
    }

    /// Files are being dragged over the thread.
    pub const fn drag_over(&mut self) {
        self.dropzone_visible = true;
    }

    /// The drag left the thread, or the files were dropped.
    pub const fn drag_leave(&mut self) {
        self.dropzone_visible = false;
    }

    /// Current pane visibility.
    #[must_use]
    pub const fn panes(&self) -> Panes {
        let active = self.active.is_some();
        Panes {
            list: !self.narrow || !active,
            thread: !self.narrow || active,
            profile: self.profile_visible && active,
        }
    }

    fn show_profile_if(&mut self, thread_has_messages: bool) {
        if self.active.is_some() && thread_has_messages && !self.narrow {
            self.profile_visible = true;
        }
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new(NARROW_BREAKPOINT, 1280)
    }
}
