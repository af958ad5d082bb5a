//! Persisted credential lifecycle.
//!
//! The store owns the single on-disk [`Session`] record.  None of its
//! operations fail loudly: a missing or malformed record loads as `None`, and
//! writes report success as a boolean.  Saves go through a temporary file in
//! the same directory followed by a rename, so a crash mid-write leaves the
//! previous record intact.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::types::Session;

/// Durable storage for the logged-in user's session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Creates a store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file backing this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted session.
    ///
    /// Returns `None` when the record is absent or cannot be parsed.
    pub fn load(&self) -> Option<Session> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "could not read session");
                return None;
            }
        };
        match serde_json::from_str::<Session>(&text) {
            Ok(session) => Some(session),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "ignoring malformed session");
                None
            }
        }
    }

    /// Persists `session`, replacing any previous record atomically.
    ///
    /// Returns false on any I/O or serialization failure; the previous record
    /// is left untouched in that case.
    pub fn save(&self, session: &Session) -> bool {
        match self.write_atomically(session) {
            Ok(()) => {
                debug!(path = %self.path.display(), user_id = %session.user_id, "session saved");
                true
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "could not save session");
                false
            }
        }
    }

    /// Deletes the persisted session.
    ///
    /// Returns true if the record is gone afterwards, including when it never
    /// existed.
    pub fn clear(&self) -> bool {
        match fs::remove_file(&self.path) {
            Ok(()) => true,
            Err(err) if err.kind() == io::ErrorKind::NotFound => true,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "could not clear session");
                false
            }
        }
    }

    fn write_atomically(&self, session: &Session) -> crate::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(session)?;

        let tmp_path = self.temp_path();
        let result = (|| -> io::Result<()> {
            let mut tmp_file = File::create(&tmp_path)?;
            tmp_file.write_all(json.as_bytes())?;
            tmp_file.sync_all()?;
            drop(tmp_file);
            fs::rename(&tmp_path, &self.path)
        })();
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        Ok(result?)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "session".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> SessionStore {
        SessionStore::new(dir.path().join("auth.json"))
    }

    #[test]
    fn load_absent_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(store_in(&dir).load(), None);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let session = Session::new("u1", "tok").with_expires_at(1_900_000_000);
        assert!(store.save(&session));
        assert_eq!(store.load(), Some(session));
        assert!(!dir.path().join("auth.json.tmp").exists());
    }

    #[test]
    fn save_replaces_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.save(&Session::new("u1", "old")));
        assert!(store.save(&Session::new("u2", "new")));
        assert_eq!(store.load(), Some(Session::new("u2", "new")));
    }

    #[test]
    fn malformed_record_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "{\"user_id\": ").unwrap();
        assert_eq!(store.load(), None);
        fs::write(store.path(), "{\"session_token\": \"tok\"}").unwrap();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.clear());
        assert!(store.save(&Session::new("u1", "tok")));
        assert!(store.clear());
        assert_eq!(store.load(), None);
        assert!(store.clear());
    }

    #[test]
    fn failed_save_keeps_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.save(&Session::new("u1", "tok")));
        // A directory squatting on the temp path makes the write fail.
        fs::create_dir(dir.path().join("auth.json.tmp")).unwrap();
        assert!(!store.save(&Session::new("u2", "other")));
        assert_eq!(store.load(), Some(Session::new("u1", "tok")));
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("nested/deeper/auth.json"));
        assert!(store.save(&Session::new("u1", "tok")));
        assert!(store.load().is_some());
    }
}
