//! Cache storage trait and its file-backed implementation.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Trait for the durable mirror behind the in-memory cache.
///
/// Keys are metric storage keys (`heartRate`, `steps`, ...) or
/// `aggregated_<key>`. Payloads are opaque serialized documents.
pub trait CacheStorage: Send + Sync {
  /// Replace the document stored under `key`.
  fn write(&self, key: &str, payload: &[u8]) -> Result<()>;

  /// Read the document under `key`, `None` if nothing was stored.
  fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

  /// Remove the document under `key`. Removing a missing key is not an error.
  fn clear(&self, key: &str) -> Result<()>;

  /// Remove every document.
  fn clear_all(&self) -> Result<()>;
}

/// Storage implementation that doesn't persist anything.
/// Used when disk persistence is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn write(&self, _key: &str, _payload: &[u8]) -> Result<()> {
    Ok(()) // Discard
  }

  fn read(&self, _key: &str) -> Result<Option<Vec<u8>>> {
    Ok(None) // Always miss
  }

  fn clear(&self, _key: &str) -> Result<()> {
    Ok(())
  }

  fn clear_all(&self) -> Result<()> {
    Ok(())
  }
}

/// In-process storage, handy for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStorage {
  documents: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn keys(&self) -> Vec<String> {
    let documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
    let mut keys: Vec<String> = documents.keys().cloned().collect();
    keys.sort();
    keys
  }
}

impl CacheStorage for MemoryStorage {
  fn write(&self, key: &str, payload: &[u8]) -> Result<()> {
    let mut documents = self
      .documents
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    documents.insert(key.to_string(), payload.to_vec());
    Ok(())
  }

  fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
    let documents = self
      .documents
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(documents.get(key).cloned())
  }

  fn clear(&self, key: &str) -> Result<()> {
    let mut documents = self
      .documents
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    documents.remove(key);
    Ok(())
  }

  fn clear_all(&self) -> Result<()> {
    let mut documents = self
      .documents
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    documents.clear();
    Ok(())
  }
}

/// One JSON document per key under a cache directory.
pub struct JsonFileStorage {
  dir: PathBuf,
}

impl JsonFileStorage {
  /// Open storage at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(Self::default_path()?)
  }

  /// Open storage rooted at `dir`, creating it if needed.
  pub fn open_at(dir: impl Into<PathBuf>) -> Result<Self> {
    let dir = dir.into();
    std::fs::create_dir_all(&dir)
      .map_err(|e| eyre!("Failed to create cache directory {}: {}", dir.display(), e))?;
    Ok(Self { dir })
  }

  /// Get the default cache directory.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("vitalsync").join("cache"))
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  fn path_for(&self, key: &str) -> Result<PathBuf> {
    if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
      return Err(eyre!("Invalid cache key: {:?}", key));
    }
    Ok(self.dir.join(format!("{}.json", key)))
  }
}

impl CacheStorage for JsonFileStorage {
  fn write(&self, key: &str, payload: &[u8]) -> Result<()> {
    let path = self.path_for(key)?;
    let tmp = path.with_extension("json.tmp");

    // Write then rename so readers never see a half-written document
    std::fs::write(&tmp, payload)
      .map_err(|e| eyre!("Failed to write {}: {}", tmp.display(), e))?;
    std::fs::rename(&tmp, &path)
      .map_err(|e| eyre!("Failed to move {} into place: {}", path.display(), e))?;

    Ok(())
  }

  fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
    let path = self.path_for(key)?;
    match std::fs::read(&path) {
      Ok(data) => Ok(Some(data)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(eyre!("Failed to read {}: {}", path.display(), e)),
    }
  }

  fn clear(&self, key: &str) -> Result<()> {
    let path = self.path_for(key)?;
    match std::fs::remove_file(&path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(eyre!("Failed to remove {}: {}", path.display(), e)),
    }
  }

  fn clear_all(&self) -> Result<()> {
    let entries = std::fs::read_dir(&self.dir)
      .map_err(|e| eyre!("Failed to list {}: {}", self.dir.display(), e))?;

    for entry in entries {
      let path = entry
        .map_err(|e| eyre!("Failed to list {}: {}", self.dir.display(), e))?
        .path();
      if path.extension().is_some_and(|ext| ext == "json") {
        std::fs::remove_file(&path)
          .map_err(|e| eyre!("Failed to remove {}: {}", path.display(), e))?;
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_json_file_storage_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let storage = JsonFileStorage::open_at(dir.path()).unwrap();

    assert!(storage.read("steps").unwrap().is_none());

    storage.write("steps", b"[1,2,3]").unwrap();
    assert_eq!(storage.read("steps").unwrap().as_deref(), Some(&b"[1,2,3]"[..]));
    assert!(dir.path().join("steps.json").exists());

    storage.write("steps", b"[]").unwrap();
    assert_eq!(storage.read("steps").unwrap().as_deref(), Some(&b"[]"[..]));

    storage.clear("steps").unwrap();
    assert!(storage.read("steps").unwrap().is_none());
    // Clearing again is fine
    storage.clear("steps").unwrap();
  }

  #[test]
  fn test_json_file_storage_clear_all() {
    let dir = tempfile::tempdir().unwrap();
    let storage = JsonFileStorage::open_at(dir.path()).unwrap();
    storage.write("heartRate", b"{}").unwrap();
    storage.write("aggregated_daily", b"{}").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "keep").unwrap();

    storage.clear_all().unwrap();
    assert!(storage.read("heartRate").unwrap().is_none());
    assert!(storage.read("aggregated_daily").unwrap().is_none());
    assert!(dir.path().join("notes.txt").exists());
  }

  #[test]
  fn test_json_file_storage_rejects_path_keys() {
    let dir = tempfile::tempdir().unwrap();
    let storage = JsonFileStorage::open_at(dir.path()).unwrap();
    assert!(storage.write("../escape", b"x").is_err());
    assert!(storage.read("").is_err());
  }

  #[test]
  fn test_noop_storage_always_misses() {
    let storage = NoopStorage;
    storage.write("steps", b"[]").unwrap();
    assert!(storage.read("steps").unwrap().is_none());
  }

  #[test]
  fn test_memory_storage() {
    let storage = MemoryStorage::new();
    storage.write("b", b"2").unwrap();
    storage.write("a", b"1").unwrap();
    assert_eq!(storage.keys(), vec!["a".to_string(), "b".to_string()]);
    storage.clear_all().unwrap();
    assert!(storage.keys().is_empty());
  }
}
