use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::CacheStoreError;
use crate::keys::{key_file_name, owner_of, KeyOwner};

/// Minimal durable key-value contract. Values are opaque strings; typed
/// records encode themselves before they get here.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), CacheStoreError>;
    fn remove(&self, key: &str) -> Result<(), CacheStoreError>;
}

/// Volatile store used when no cache directory is configured, and by tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        lock_unpoisoned(&self.entries).keys().cloned().collect()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError> {
        validate_key(key)?;
        Ok(lock_unpoisoned(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheStoreError> {
        validate_key(key)?;
        lock_unpoisoned(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheStoreError> {
        validate_key(key)?;
        lock_unpoisoned(&self.entries).remove(key);
        Ok(())
    }
}

/// One file per key under `root`. Writes go to a temporary sibling and are
/// renamed into place, so readers never observe a torn value.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn open(root: &Path) -> Result<Self, CacheStoreError> {
        fs::create_dir_all(root)
            .map_err(|source| CacheStoreError::io("creating cache directory", root, source))?;
        Ok(Self {
            root: root.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key_file_name(key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError> {
        validate_key(key)?;
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CacheStoreError::io("reading cache entry", path, source)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheStoreError> {
        validate_key(key)?;
        let path = self.path_for(key);
        let staging = self
            .root
            .join(format!(".{}.{}.tmp", key_file_name(key), uuid::Uuid::new_v4()));

        let _guard = lock_unpoisoned(&self.write_lock);
        fs::write(&staging, value)
            .map_err(|source| CacheStoreError::io("writing cache staging file", &staging, source))?;
        if let Err(source) = fs::rename(&staging, &path) {
            let _ = fs::remove_file(&staging);
            return Err(CacheStoreError::io("replacing cache entry", path, source));
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheStoreError> {
        validate_key(key)?;
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheStoreError::io("removing cache entry", path, source)),
        }
    }
}

/// View of a shared store restricted to the keys of one [`KeyOwner`].
#[derive(Clone)]
pub struct ScopedStore {
    inner: Arc<dyn KeyValueStore>,
    owner: KeyOwner,
}

impl ScopedStore {
    #[must_use]
    pub fn new(inner: Arc<dyn KeyValueStore>, owner: KeyOwner) -> Self {
        Self { inner, owner }
    }

    #[must_use]
    pub fn owner(&self) -> KeyOwner {
        self.owner
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError> {
        self.check(key)?;
        self.inner.get(key)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), CacheStoreError> {
        self.check(key)?;
        self.inner.set(key, value)
    }

    pub fn remove(&self, key: &str) -> Result<(), CacheStoreError> {
        self.check(key)?;
        self.inner.remove(key)
    }

    fn check(&self, key: &str) -> Result<(), CacheStoreError> {
        if owner_of(key) == Some(self.owner) {
            Ok(())
        } else {
            Err(CacheStoreError::ForeignKey {
                key: key.to_string(),
                owner: self.owner,
            })
        }
    }
}

impl std::fmt::Debug for ScopedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedStore")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

fn validate_key(key: &str) -> Result<(), CacheStoreError> {
    if key.is_empty() || key.chars().any(char::is_control) {
        return Err(CacheStoreError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
