//! Client-local persistence port
//!
//! Resume records and the last-used server live behind the [`Store`] trait
//! so the pipeline never touches a process-wide singleton. [`MemoryStore`]
//! backs tests and embedders; [`FileStore`] writes one JSON file per key
//! under ~/.local/share/animestream/.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Key holding the "continue watching" JSON array
pub const RESUME_KEY: &str = "continueWatching";

/// Key holding the last-used server name
pub const PREFERRED_SERVER_KEY: &str = "preferredServer";

/// Named-record storage with load/save semantics
///
/// Writes are whole-value replacements; concurrent writers race and the
/// last write wins.
pub trait Store: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn save(&self, key: &str, value: &str) -> Result<()>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let records = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(records.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        records.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// File-backed store, one `<key>.json` per record
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Store rooted at the platform data dir
    pub fn new() -> Result<Self> {
        let dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?
            .join("animestream");
        Ok(Self { dir })
    }

    /// Store rooted at a custom directory (for testing)
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

impl Store for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(Some(raw))
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.path_for(key);
        std::fs::write(&path, value).with_context(|| format!("writing {}", path.display()))?;
        debug!(path = %path.display(), "saved record");
        Ok(())
    }
}

/// Last-used server name
pub struct ServerPreference<'a> {
    store: &'a dyn Store,
}

impl<'a> ServerPreference<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Stored server, `None` when unset or unreadable
    pub fn get(&self) -> Option<String> {
        match self.store.load(PREFERRED_SERVER_KEY) {
            Ok(Some(raw)) => serde_json::from_str::<String>(&raw)
                .ok()
                .or_else(|| Some(raw.trim().to_string()))
                .filter(|s| !s.is_empty()),
            Ok(None) => None,
            Err(e) => {
                warn!("failed to read server preference: {:#}", e);
                None
            }
        }
    }

    pub fn set(&self, server: &str) -> Result<()> {
        self.store
            .save(PREFERRED_SERVER_KEY, &serde_json::to_string(server)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("animestream-store-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.load("k").unwrap().is_none());
        store.save("k", "[1]").unwrap();
        store.save("k", "[2]").unwrap();
        assert_eq!(store.load("k").unwrap().as_deref(), Some("[2]"));
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = temp_dir();
        let store = FileStore::with_dir(&dir);
        assert!(store.load(RESUME_KEY).unwrap().is_none());

        store.save(RESUME_KEY, "[]").unwrap();
        assert_eq!(store.load(RESUME_KEY).unwrap().as_deref(), Some("[]"));
        assert!(dir.join("continueWatching.json").exists());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_file_store_sanitizes_key() {
        let store = FileStore::with_dir("/tmp/x");
        assert_eq!(store.path_for("../evil"), PathBuf::from("/tmp/x/___evil.json"));
    }

    #[test]
    fn test_server_preference() {
        let store = MemoryStore::new();
        let pref = ServerPreference::new(&store);
        assert_eq!(pref.get(), None);
        pref.set("hd-2").unwrap();
        assert_eq!(pref.get().as_deref(), Some("hd-2"));

        // Bare strings written by other clients are accepted too
        store.save(PREFERRED_SERVER_KEY, "hd-1").unwrap();
        assert_eq!(ServerPreference::new(&store).get().as_deref(), Some("hd-1"));
    }
}
