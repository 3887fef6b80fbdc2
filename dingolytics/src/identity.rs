//! Client identity and the storage capability behind it
//!
//! A client identifier is generated once per storage scope and reused by
//! every tracker constructed against the same storage and key.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock};

use uuid::{Uuid, Variant};

use crate::error::{TrackerError, TrackerResult};

/// Key-value storage capability
///
/// All methods take `&self`; implementations use interior mutability.
pub trait ClientStorage: Send + Sync {
    /// Read a value. `Ok(None)` when the key is absent.
    fn get(&self, key: &str) -> TrackerResult<Option<String>>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> TrackerResult<()>;

    /// Backend name (for logging/debugging)
    fn name(&self) -> &'static str;

    /// Return the non-empty value under `key`, or store and return `make()`.
    ///
    /// The flag is `true` when the value was created. Backends shared across
    /// threads override this so the read and the write happen under one lock.
    fn get_or_insert_with(
        &self,
        key: &str,
        make: &dyn Fn() -> String,
    ) -> TrackerResult<(String, bool)> {
        if let Some(existing) = self.get(key)? {
            if !existing.is_empty() {
                return Ok((existing, false));
            }
        }
        let value = make();
        self.set(key, &value)?;
        Ok((value, true))
    }
}

/// Session-scoped in-memory storage (default)
///
/// The scope is the storage value itself: share it through an `Arc` to
/// share the identity, drop it to reset.
#[derive(Debug, Default)]
pub struct SessionStorage {
    values: RwLock<HashMap<String, String>>,
}

impl SessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut values) = self.values.write() {
            values.clear();
        }
    }
}

impl ClientStorage for SessionStorage {
    fn get(&self, key: &str) -> TrackerResult<Option<String>> {
        let values = self
            .values
            .read()
            .map_err(|_| TrackerError::Storage("session storage lock poisoned".into()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> TrackerResult<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| TrackerError::Storage("session storage lock poisoned".into()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "session"
    }

    fn get_or_insert_with(
        &self,
        key: &str,
        make: &dyn Fn() -> String,
    ) -> TrackerResult<(String, bool)> {
        let mut values = self
            .values
            .write()
            .map_err(|_| TrackerError::Storage("session storage lock poisoned".into()))?;
        if let Some(existing) = values.get(key).filter(|v| !v.is_empty()) {
            return Ok((existing.clone(), false));
        }

        let value = make();
        values.insert(key.to_string(), value.clone());
        Ok((value, true))
    }
}

/// Durable storage backed by a JSON object file
///
/// A missing file reads as empty. Writes go to a sibling temp file that
/// is renamed over the target, so readers never see a partial file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> TrackerResult<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| TrackerError::Storage("file storage lock poisoned".into()))
    }

    fn load(&self) -> TrackerResult<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                TrackerError::Storage(format!("corrupt storage file {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, values: &BTreeMap<String, String>) -> TrackerResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(format!(".{}.tmp", std::process::id()));
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, serde_json::to_string_pretty(values)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ClientStorage for FileStorage {
    fn get(&self, key: &str) -> TrackerResult<Option<String>> {
        let _guard = self.lock()?;
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> TrackerResult<()> {
        let _guard = self.lock()?;
        let mut values = self.load()?;
        values.insert(key.to_string(), value.to_string());
        self.store(&values)
    }

    fn name(&self) -> &'static str {
        "file"
    }

    fn get_or_insert_with(
        &self,
        key: &str,
        make: &dyn Fn() -> String,
    ) -> TrackerResult<(String, bool)> {
        let _guard = self.lock()?;
        let mut values = self.load()?;
        if let Some(existing) = values.get(key).filter(|v| !v.is_empty()) {
            return Ok((existing.clone(), false));
        }

        let value = make();
        values.insert(key.to_string(), value.clone());
        self.store(&values)?;
        Ok((value, true))
    }
}

/// Generate a fresh client identifier
///
/// Layout `xxxxxxxx-xxxx-4xxx-yxxx-xxxxxxxxxxxx`, lowercase, 122 random bits.
pub fn generate_client_id() -> String {
    Uuid::new_v4().hyphenated().to_string()
}

/// Check that a value has the client identifier layout
pub fn is_client_id(value: &str) -> bool {
    if value.len() != 36 || value.bytes().any(|b| b.is_ascii_uppercase()) {
        return false;
    }
    Uuid::try_parse(value)
        .map(|id| id.get_version_num() == 4 && id.get_variant() == Variant::RFC4122)
        .unwrap_or(false)
}

/// Return the stored client identifier, creating and storing one if absent
pub fn get_or_create_client_id(storage: &dyn ClientStorage, key: &str) -> TrackerResult<String> {
    resolve_client_id(storage, key).map(|(id, _)| id)
}

/// Like [`get_or_create_client_id`], also reporting whether the id was created
pub(crate) fn resolve_client_id(
    storage: &dyn ClientStorage,
    key: &str,
) -> TrackerResult<(String, bool)> {
    storage.get_or_insert_with(key, &generate_client_id)
}
