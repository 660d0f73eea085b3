//! On-disk persistence of authentication state.
//!
//! One JSON file maps account identifiers to cookie sets. Writes go through
//! read-then-merge-then-overwrite so entries for other accounts survive, and
//! land via temp file + atomic rename. There is no locking against
//! concurrent processes.

use crate::error::store::StoreError;

use common::{CookieSet, ErrorLocation};

use std::collections::BTreeMap;
use std::panic::Location;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

/// Default file name, placed in the user's home directory when available.
pub const DEFAULT_STORE_FILE: &str = ".ask_session";

/// Store for recovering authentication cookies across process restarts.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location: `~/.ask_session`, falling back to the
    /// working directory when no home directory is known.
    pub fn default_location() -> Self {
        let path = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_STORE_FILE);
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recover the cookie set persisted for `account`, if any.
    ///
    /// A missing file is not an error; a corrupt file is.
    pub fn recover(&self, account: &str) -> Result<Option<CookieSet>, StoreError> {
        let mut entries = self.read_entries()?;
        match entries.remove(account) {
            Some(cookies) => {
                info!(
                    "recovered {} cookies for account from {}",
                    cookies.len(),
                    self.path.display()
                );
                Ok(Some(cookies))
            }
            None => {
                debug!("no persisted session for account in {}", self.path.display());
                Ok(None)
            }
        }
    }

    /// Persist `cookies` for `account`, merging with existing entries.
    pub fn persist(&self, account: &str, cookies: &CookieSet) -> Result<(), StoreError> {
        // A corrupt existing file loses the other entries rather than
        // blocking the write; the current session's cookies matter more.
        let mut entries = self.read_entries().unwrap_or_else(|e| {
            warn!("discarding unreadable session store: {e}");
            BTreeMap::new()
        });
        entries.insert(account.to_string(), cookies.clone());

        let json = serde_json::to_string_pretty(&entries).map_err(|e| {
            StoreError::SerializeError {
                location: ErrorLocation::from(Location::caller()),
                reason: e.to_string(),
            }
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::WriteError {
                    location: ErrorLocation::from(Location::caller()),
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let temp_path = self.path.with_extension("tmp");

        std::fs::write(&temp_path, json).map_err(|e| StoreError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: temp_path.clone(),
            source: e,
        })?;

        // Atomic rename (POSIX guarantees atomicity)
        std::fs::rename(&temp_path, &self.path).map_err(|e| StoreError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: self.path.clone(),
            source: e,
        })?;

        info!(
            "persisted {} cookies for account to {}",
            cookies.len(),
            self.path.display()
        );
        Ok(())
    }

    fn read_entries(&self) -> Result<BTreeMap<String, CookieSet>, StoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let contents = std::fs::read_to_string(&self.path).map_err(|e| StoreError::ReadError {
            location: ErrorLocation::from(Location::caller()),
            path: self.path.clone(),
            source: e,
        })?;

        serde_json::from_str(&contents).map_err(|e| StoreError::ParseError {
            location: ErrorLocation::from(Location::caller()),
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }
}
