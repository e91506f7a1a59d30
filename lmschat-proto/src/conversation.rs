//! Conversation entries shown in the directory sidebar.

use serde::{Deserialize, Serialize};

use crate::message::Timestamp;
use crate::user::{Role, User, UserId};

/// Preview text shown for a conversation before any message is loaded.
pub const DEFAULT_PREVIEW: &str = "Click to start conversation";

/// A reachable counterpart of the current user.
///
/// The conversation is keyed by the counterpart's user id. It is created
/// when the directory is built and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Counterpart user id.
    pub id: UserId,
    /// Counterpart display name.
    pub name: String,
    /// Counterpart role.
    pub role: Role,
    /// Counterpart avatar reference.
    pub avatar: Option<String>,
    /// Counterpart e-mail address.
    pub email: String,
    /// Presence flag. Randomly drawn when the directory is built; not live.
    pub online: bool,
    /// When the counterpart was last seen, if known.
    pub last_seen: Option<Timestamp>,
    /// Last-message preview string.
    pub last_message: String,
    /// Unread message count. Always zero.
    pub unread: u32,
}

impl Conversation {
    /// Builds a conversation entry for `user` with the given presence flag.
    #[must_use]
    pub fn for_user(user: &User, online: bool) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            role: user.role,
            avatar: user.profile_pic.clone(),
            email: user.email.clone(),
            online,
            last_seen: user.last_seen,
            last_message: DEFAULT_PREVIEW.to_string(),
            unread: 0,
        }
    }

    /// Short description shown in the contact-detail panel.
    #[must_use]
    pub const fn about(&self) -> &'static str {
        match self.role {
            Role::Teacher => "Dedicated educator helping students achieve their academic goals.",
            Role::Admin | Role::Student => "Administrative support for all your academic needs.",
        }
    }
}
