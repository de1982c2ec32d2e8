//! Batch selection - the launch script used for start/stop/restart
//!
//! The only validation is the extension rule for the target OS. The client
//! cannot see the server's filesystem, so existence is never checked.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ConsoleError, StoreError};
use crate::store::{get_json, keys, put_json, KvStore};

/// Operating system of the managed server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsTarget {
    Windows,
    Unix,
}

impl OsTarget {
    /// Target matching the machine this binary was built for
    pub fn host() -> Self {
        if cfg!(windows) {
            OsTarget::Windows
        } else {
            OsTarget::Unix
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OsTarget::Windows => "windows",
            OsTarget::Unix => "unix",
        }
    }

    /// Accepted launch script extension
    pub fn extension(&self) -> &'static str {
        match self {
            OsTarget::Windows => ".bat",
            OsTarget::Unix => ".sh",
        }
    }
}

impl Default for OsTarget {
    fn default() -> Self {
        OsTarget::host()
    }
}

impl fmt::Display for OsTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OsTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "windows" | "win" => Ok(OsTarget::Windows),
            "unix" | "linux" => Ok(OsTarget::Unix),
            other => Err(format!("unknown OS target {other:?} (expected windows or unix)")),
        }
    }
}

/// True iff `path` is non-blank and ends with the script extension for `os`
pub fn validate(path: &str, os: OsTarget) -> bool {
    let path = path.trim();
    !path.is_empty() && path.to_lowercase().ends_with(os.extension())
}

/// Result of adding a favorite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteOutcome {
    Added,
    AlreadyPresent,
}

pub struct BatchSelector {
    server_id: String,
    os: OsTarget,
    batch_path: Option<String>,
    favorites: Vec<String>,
    store: Arc<dyn KvStore>,
}

impl BatchSelector {
    /// Load the active batch for `server_id` and the favorites for `os`.
    ///
    /// A persisted batch path that does not fit `os` is dropped.
    pub fn load(store: Arc<dyn KvStore>, server_id: &str, os: OsTarget) -> Result<Self, StoreError> {
        let mut batch_path: Option<String> = get_json(store.as_ref(), &keys::batch(server_id))?;
        if let Some(path) = batch_path.as_deref() {
            if !validate(path, os) {
                warn!(
                    component = "batch",
                    event = "batch.persisted_invalid",
                    server_id = %server_id,
                    path = %path,
                    os = %os,
                    "Ignoring persisted batch path for another OS target"
                );
                batch_path = None;
            }
        }

        let favorites: Vec<String> =
            get_json(store.as_ref(), &keys::favorites(os))?.unwrap_or_default();

        Ok(Self {
            server_id: server_id.to_string(),
            os,
            batch_path,
            favorites,
            store,
        })
    }

    pub fn os(&self) -> OsTarget {
        self.os
    }

    pub fn batch_path(&self) -> Option<&str> {
        self.batch_path.as_deref()
    }

    pub fn favorites(&self) -> &[String] {
        &self.favorites
    }

    pub fn validate(&self, path: &str) -> bool {
        validate(path, self.os)
    }

    /// Add `path` to the favorites. Invalid paths are rejected; duplicates
    /// are reported as `AlreadyPresent` without touching the store.
    pub fn add_favorite(&mut self, path: &str) -> Result<FavoriteOutcome, ConsoleError> {
        let path = self.checked(path)?;
        if self.favorites.iter().any(|fav| *fav == path) {
            return Ok(FavoriteOutcome::AlreadyPresent);
        }
        self.favorites.push(path);
        put_json(self.store.as_ref(), &keys::favorites(self.os), &self.favorites)?;
        Ok(FavoriteOutcome::Added)
    }

    /// Remove by exact match. Returns whether anything was removed.
    pub fn remove_favorite(&mut self, path: &str) -> Result<bool, StoreError> {
        let before = self.favorites.len();
        self.favorites.retain(|fav| fav != path);
        if self.favorites.len() == before {
            return Ok(false);
        }
        put_json(self.store.as_ref(), &keys::favorites(self.os), &self.favorites)?;
        Ok(true)
    }

    /// Make `path` the active batch file. Selecting also favorites it.
    pub fn select(&mut self, path: &str) -> Result<FavoriteOutcome, ConsoleError> {
        let path = self.checked(path)?;
        put_json(self.store.as_ref(), &keys::batch(&self.server_id), &path)?;
        self.batch_path = Some(path.clone());
        info!(
            component = "batch",
            event = "batch.selected",
            server_id = %self.server_id,
            path = %path,
        );
        self.add_favorite(&path)
    }

    /// Forget the active batch file for this server
    pub fn clear_selection(&mut self) -> Result<(), StoreError> {
        self.batch_path = None;
        self.store.delete(&keys::batch(&self.server_id))
    }

    fn checked(&self, path: &str) -> Result<String, ConsoleError> {
        let trimmed = path.trim();
        if !self.validate(trimmed) {
            return Err(ConsoleError::InvalidBatchPath {
                path: path.to_string(),
                os: self.os,
            });
        }
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn selector(os: OsTarget) -> BatchSelector {
        BatchSelector::load(Arc::new(MemoryStore::new()), "pz-01", os).unwrap()
    }

    #[test]
    fn extension_rule_per_os() {
        assert!(validate(r"C:\srv\start.bat", OsTarget::Windows));
        assert!(validate(r"C:\SRV\START.BAT", OsTarget::Windows));
        assert!(!validate("/srv/start.sh", OsTarget::Windows));
        assert!(validate("/srv/start.sh", OsTarget::Unix));
        assert!(!validate("/srv/start.bat", OsTarget::Unix));
        assert!(!validate("   ", OsTarget::Unix));
        assert!(!validate("", OsTarget::Windows));
        assert!(!validate(".shx", OsTarget::Unix));
    }

    #[test]
    fn select_sets_path_and_sole_favorite() {
        let mut batch = selector(OsTarget::Windows);
        let outcome = batch.select(r"C:\srv\start.bat").unwrap();

        assert_eq!(outcome, FavoriteOutcome::Added);
        assert_eq!(batch.batch_path(), Some(r"C:\srv\start.bat"));
        assert_eq!(batch.favorites(), &[r"C:\srv\start.bat".to_string()]);
    }

    #[test]
    fn select_rejects_wrong_extension_without_state_change() {
        let mut batch = selector(OsTarget::Windows);
        let err = batch.select("/srv/start.sh").unwrap_err();

        assert!(matches!(err, ConsoleError::InvalidBatchPath { .. }));
        assert_eq!(batch.batch_path(), None);
        assert!(batch.favorites().is_empty());
    }

    #[test]
    fn add_favorite_is_idempotent() {
        let mut batch = selector(OsTarget::Unix);
        assert_eq!(batch.add_favorite("/srv/start.sh").unwrap(), FavoriteOutcome::Added);
        assert_eq!(
            batch.add_favorite("/srv/start.sh").unwrap(),
            FavoriteOutcome::AlreadyPresent
        );
        assert_eq!(batch.favorites().len(), 1);
    }

    #[test]
    fn remove_favorite_is_exact_match() {
        let mut batch = selector(OsTarget::Unix);
        batch.add_favorite("/srv/a.sh").unwrap();
        batch.add_favorite("/srv/b.sh").unwrap();

        assert!(!batch.remove_favorite("/SRV/A.SH").unwrap());
        assert!(batch.remove_favorite("/srv/a.sh").unwrap());
        assert_eq!(batch.favorites(), &["/srv/b.sh".to_string()]);
    }

    #[test]
    fn favorites_are_shared_across_servers_of_one_os() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let mut first = BatchSelector::load(store.clone(), "a", OsTarget::Unix).unwrap();
        first.select("/srv/a.sh").unwrap();

        let second = BatchSelector::load(store.clone(), "b", OsTarget::Unix).unwrap();
        assert_eq!(second.favorites(), &["/srv/a.sh".to_string()]);
        assert_eq!(second.batch_path(), None);

        let windows = BatchSelector::load(store, "a", OsTarget::Windows).unwrap();
        assert!(windows.favorites().is_empty());
        // The unix script does not fit the windows target
        assert_eq!(windows.batch_path(), None);
    }

    #[test]
    fn selection_persists_per_server() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let mut batch = BatchSelector::load(store.clone(), "pz-01", OsTarget::Unix).unwrap();
        batch.select("/srv/start.sh").unwrap();

        let reloaded = BatchSelector::load(store.clone(), "pz-01", OsTarget::Unix).unwrap();
        assert_eq!(reloaded.batch_path(), Some("/srv/start.sh"));

        let mut reloaded = reloaded;
        reloaded.clear_selection().unwrap();
        let cleared = BatchSelector::load(store, "pz-01", OsTarget::Unix).unwrap();
        assert_eq!(cleared.batch_path(), None);
    }
}
