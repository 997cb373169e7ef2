// Wizard session persistence port
//
// The store only ever reads and writes one opaque JSON blob under a fixed key. Parsing,
// migration and corruption fallback live in `session.rs`, so every backend here stays a
// dumb byte container.

use anyhow::{Context, Result};
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Fixed namespace key for the persisted wizard session record.
pub const SESSION_STORAGE_KEY: &str = "ushadow-wizard-state";

pub trait SessionPersistence {
    /// Raw record, or `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<String>>;
    fn save(&self, raw: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

impl<T: SessionPersistence + ?Sized> SessionPersistence for Box<T> {
    fn load(&self) -> Result<Option<String>> {
        (**self).load()
    }

    fn save(&self, raw: &str) -> Result<()> {
        (**self).save(raw)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}

/// One JSON file named after the storage key inside a state directory.
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(format!("{}.json", SESSION_STORAGE_KEY)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionPersistence for FileSessionStorage {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session state: {:?}", self.path))?;
        Ok(Some(raw))
    }

    fn save(&self, raw: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create state directory: {:?}", parent))?;
        }
        // Write-then-rename so a crash mid-write never leaves a truncated record.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw)
            .with_context(|| format!("Failed to write session state: {:?}", tmp))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace session state: {:?}", self.path))?;
        debug!(
            "[PHASE: wizard] [STEP: persist] Session state saved (path={:?}, bytes={})",
            self.path,
            raw.len()
        );
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove session state: {:?}", self.path)),
        }
    }
}

/// In-memory backend for tests and smoke modes. Clones share the same slot, so a test can
/// hand one clone to a store and inspect or pre-seed the record through another.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStorage {
    slot: Arc<Mutex<Option<String>>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(raw.into()))),
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.slot.lock().ok().and_then(|g| g.clone())
    }
}

impl SessionPersistence for MemorySessionStorage {
    fn load(&self) -> Result<Option<String>> {
        let guard = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("Session storage lock poisoned"))?;
        Ok(guard.clone())
    }

    fn save(&self, raw: &str) -> Result<()> {
        let mut guard = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("Session storage lock poisoned"))?;
        *guard = Some(raw.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut guard = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("Session storage lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_storage_round_trips_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSessionStorage::new(dir.path());
        assert!(storage.load().unwrap().is_none());

        storage.save(r#"{"mode":"local"}"#).unwrap();
        assert_eq!(
            storage.load().unwrap().as_deref(),
            Some(r#"{"mode":"local"}"#)
        );
        assert!(storage
            .path()
            .ends_with(format!("{}.json", SESSION_STORAGE_KEY)));

        storage.clear().unwrap();
        assert!(storage.load().unwrap().is_none());
        // Clearing twice is fine.
        storage.clear().unwrap();
    }

    #[test]
    fn file_storage_creates_missing_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let storage = FileSessionStorage::new(&nested);
        storage.save("{}").unwrap();
        assert!(nested.exists());
    }

    #[test]
    fn memory_storage_clones_share_slot() {
        let a = MemorySessionStorage::new();
        let b = a.clone();
        a.save("x").unwrap();
        assert_eq!(b.raw().as_deref(), Some("x"));
        b.clear().unwrap();
        assert!(a.load().unwrap().is_none());
    }
}
