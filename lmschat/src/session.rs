//! Current-user provider.
//!
//! The signed-in user lives in a small key-value store under
//! [`CURRENT_USER_KEY`] as a JSON blob. Hosts pick the backing store:
//! [`InMemorySessionStore`] for tests and embedding, [`FileSessionStore`]
//! for the demo binary so a sign-in survives restarts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use lmschat_proto::user::User;

/// Key under which the signed-in user is stored.
pub const CURRENT_USER_KEY: &str = "user";

/// Errors from a session store.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Reading or writing the backing file failed.
    #[error("session file {path}: {source}")]
    Io {
        /// Path of the session file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Stored data is not valid JSON of the expected shape.
    #[error("corrupt session data: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// String key-value store holding session state.
pub trait SessionStore: Send + Sync {
    /// Value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, SessionError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the backing store cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), SessionError>;

    /// Remove `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the backing store cannot be written.
    fn clear(&self, key: &str) -> Result<(), SessionError>;
}

/// The signed-in user, if any.
///
/// # Errors
///
/// Returns [`SessionError::Corrupt`] if the stored blob is not a user.
pub fn current_user<S: SessionStore + ?Sized>(store: &S) -> Result<Option<User>, SessionError> {
    store
        .get(CURRENT_USER_KEY)?
        .map(|blob| serde_json::from_str(&blob))
        .transpose()
        .map_err(SessionError::from)
}

/// Record `user` as signed in.
///
/// # Errors
///
/// Returns [`SessionError`] if the store cannot be written.
pub fn sign_in<S: SessionStore + ?Sized>(store: &S, user: &User) -> Result<(), SessionError> {
    let blob = serde_json::to_string(user)?;
    store.set(CURRENT_USER_KEY, &blob)?;
    tracing::info!(user = %user.id, role = %user.role, "signed in");
    Ok(())
}

/// Forget the signed-in user.
///
/// # Errors
///
/// Returns [`SessionError`] if the store cannot be written.
pub fn logout<S: SessionStore + ?Sized>(store: &S) -> Result<(), SessionError> {
    store.clear(CURRENT_USER_KEY)?;
    tracing::info!("signed out");
    Ok(())
}

/// Process-local session store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl InMemorySessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), SessionError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Session store backed by a JSON object on disk.
///
/// Every operation reads the whole file and `set`/`clear` rewrite it. A
/// missing file is an empty store.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStore {
    /// Use the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `<data dir>/lmschat/session.json`, if the platform has a data dir.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("lmschat").join("session.json"))
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> SessionError {
        SessionError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn read(&self) -> Result<BTreeMap<String, String>, SessionError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(self.io_err(e)),
        }
    }

    fn write(&self, entries: &BTreeMap<String, String>) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, json).map_err(|e| self.io_err(e))
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        let _guard = self.lock.lock();
        Ok(self.read()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let _guard = self.lock.lock();
        let mut entries = self.read()?;
        entries.insert(key.to_string(), value.to_string());
        self.write(&entries)
    }

    fn clear(&self, key: &str) -> Result<(), SessionError> {
        let _guard = self.lock.lock();
        let mut entries = self.read()?;
        if entries.remove(key).is_some() {
            self.write(&entries)?;
        }
        Ok(())
    }
}
