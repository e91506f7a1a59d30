//! Conversation directory.
//!
//! Derives the list of reachable counterparts from a roster: everyone whose
//! role differs from the current user's role, minus the current user. Each
//! entry gets a presence flag from an independent random draw. That flag is
//! a presentation stub, not a real presence protocol, so it is
//! non-deterministic unless the caller seeds the rng.

use std::path::{Path, PathBuf};

use rand::Rng;

use lmschat_proto::conversation::Conversation;
use lmschat_proto::message::Timestamp;
use lmschat_proto::user::{Role, User, UserId};

use crate::config::probability;

/// Default probability that a counterpart is shown as online.
pub const DEFAULT_ONLINE_PROBABILITY: f64 = 0.7;

/// Errors that can occur when loading a roster file.
#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    /// Failed to read the roster file.
    #[error("failed to read roster file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the roster TOML.
    #[error("failed to parse roster file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Two roster entries share an id.
    #[error("duplicate user id in roster: {0}")]
    DuplicateId(UserId),
}

/// Read-only source of user records.
pub trait UserRepository: Send + Sync {
    /// All users, in roster order.
    fn users(&self) -> Vec<User>;

    /// Look up a single user by id.
    fn find(&self, id: &UserId) -> Option<User> {
        self.users().into_iter().find(|u| u.id == *id)
    }

    /// Revision counter, bumped whenever the roster contents change.
    fn revision(&self) -> u64;
}

/// `[[users]]` table layout of a roster file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RosterFile {
    users: Vec<User>,
}

/// A fixed, in-memory roster.
#[derive(Debug, Clone)]
pub struct StaticRoster {
    users: Vec<User>,
}

impl StaticRoster {
    /// Create a roster from explicit users.
    ///
    /// # Errors
    ///
    /// Returns [`RosterError::DuplicateId`] if two users share an id.
    pub fn new(users: Vec<User>) -> Result<Self, RosterError> {
        for (i, user) in users.iter().enumerate() {
            if users[..i].iter().any(|u| u.id == user.id) {
                return Err(RosterError::DuplicateId(user.id.clone()));
            }
        }
        Ok(Self { users })
    }

    /// Parse a roster from TOML text containing `[[users]]` entries.
    ///
    /// # Errors
    ///
    /// Returns [`RosterError::Parse`] on malformed TOML or
    /// [`RosterError::DuplicateId`] on repeated ids.
    pub fn from_toml(text: &str) -> Result<Self, RosterError> {
        let file: RosterFile = toml::from_str(text)?;
        Self::new(file.users)
    }

    /// Load a roster file from disk.
    ///
    /// # Errors
    ///
    /// Returns [`RosterError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, RosterError> {
        let text = std::fs::read_to_string(path).map_err(|e| RosterError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&text)
    }

    /// The built-in demo roster: two teachers, an admin and two students.
    #[must_use]
    pub fn demo() -> Self {
        let now = Timestamp::now();
        let user = |id: &str, name: &str, email: &str, role: Role, pic: &str| User {
            id: UserId::new(id),
            name: name.to_string(),
            email: email.to_string(),
            role,
            profile_pic: Some(pic.to_string()),
            online: true,
            last_seen: Some(now),
        };

        let mut osinde = user(
            "2",
            "Prof. Nimrod Osinde",
            "osinde@lms.com",
            Role::Teacher,
            "/images/kenato.jpg",
        );
        osinde.online = false;
        osinde.last_seen = Some(now.saturating_sub_millis(30 * 60 * 1000));

        Self {
            users: vec![
                user(
                    "1",
                    "Dr. Mary Jaoko",
                    "mary@lms.com",
                    Role::Teacher,
                    "/images/kenato.jpg",
                ),
                osinde,
                user(
                    "3",
                    "Admin Support",
                    "admin@lms.com",
                    Role::Admin,
                    "/images/admin.jpg",
                ),
                user(
                    "student-1",
                    "Vidah Limaya",
                    "vida@lms.com",
                    Role::Student,
                    "/images/vida.jpg",
                ),
                user(
                    "student-2",
                    "Bathseba Kerubo",
                    "kerubo@lms.com",
                    Role::Student,
                    "/images/kerubo.jpg",
                ),
            ],
        }
    }
}

impl UserRepository for StaticRoster {
    fn users(&self) -> Vec<User> {
        self.users.clone()
    }

    fn find(&self, id: &UserId) -> Option<User> {
        self.users.iter().find(|u| u.id == *id).cloned()
    }

    fn revision(&self) -> u64 {
        0
    }
}

/// Build the conversation list for `current_user` from `roster`.
///
/// Keeps users whose role differs from the current user's role and whose id
/// differs from the current user's id, in roster order. Each kept user is
/// marked online with probability `online_probability`.
pub fn build_directory<R: Rng + ?Sized>(
    current_user: &User,
    roster: &[User],
    rng: &mut R,
    online_probability: f64,
) -> Vec<Conversation> {
    let p = probability(online_probability);
    roster
        .iter()
        .filter(|u| u.role != current_user.role && u.id != current_user.id)
        .map(|u| Conversation::for_user(u, rng.random_bool(p)))
        .collect()
}

/// Filter conversations by a case-insensitive substring of the display name.
///
/// The term is matched as given, so only the empty term matches everything.
#[must_use]
pub fn search<'a>(conversations: &'a [Conversation], term: &str) -> Vec<&'a Conversation> {
    let needle = term.to_lowercase();
    conversations
        .iter()
        .filter(|c| c.name.to_lowercase().contains(&needle))
        .collect()
}

/// Memoised conversation list.
///
/// Rebuilt only when the current user or the roster revision changes, so
/// presence flags stay stable between refreshes.
#[derive(Debug, Default)]
pub struct Directory {
    key: Option<(UserId, u64)>,
    conversations: Vec<Conversation>,
}

impl Directory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the conversation list if `current_user` or the roster changed.
    ///
    /// Returns `true` if the list was rebuilt.
    pub fn refresh<U: UserRepository + ?Sized, R: Rng + ?Sized>(
        &mut self,
        current_user: &User,
        roster: &U,
        rng: &mut R,
        online_probability: f64,
    ) -> bool {
        let key = (current_user.id.clone(), roster.revision());
        if self.key.as_ref() == Some(&key) {
            return false;
        }
        self.conversations =
            build_directory(current_user, &roster.users(), rng, online_probability);
        tracing::debug!(
            user = %current_user.id,
            conversations = self.conversations.len(),
            "conversation directory rebuilt"
        );
        self.key = Some(key);
        true
    }

    /// The current conversation list.
    #[must_use]
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Look up a conversation by counterpart id.
    #[must_use]
    pub fn get(&self, id: &UserId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == *id)
    }
}
