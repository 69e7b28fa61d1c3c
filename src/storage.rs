//! Durable key-value storage.
//!
//! The preference store, the translation cache and the performance monitor
//! persist through this minimal interface. Values are opaque strings (JSON
//! in practice). All operations are synchronous: callers never hold a lock
//! across an `.await`, so check-then-mutate sequences stay consistent under
//! cooperative scheduling.

use crate::error::{I18nError, I18nResult};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> I18nResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> I18nResult<()>;
    fn delete(&self, key: &str) -> I18nResult<()>;
    /// Every key starting with `prefix`, in lexical order.
    fn keys(&self, prefix: &str) -> I18nResult<Vec<String>>;
}

fn lock<T>(mutex: &Mutex<T>) -> I18nResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| I18nError::Storage("storage lock poisoned".to_string()))
}

/// Volatile store, used when no storage directory is configured and in tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<dyn KvStore> {
        Arc::new(Self::new())
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> I18nResult<Option<String>> {
        Ok(lock(&self.entries)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> I18nResult<()> {
        lock(&self.entries)?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> I18nResult<()> {
        lock(&self.entries)?.remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> I18nResult<Vec<String>> {
        let mut keys: Vec<String> = lock(&self.entries)?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// File-backed store: one JSON object per file, loaded on open and rewritten
/// atomically (temp file + rename) after every mutation.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open (or create) `{dir}/{name}`.
    pub fn open(dir: &Path, name: &str) -> I18nResult<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            I18nError::Storage(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let path = dir.join(name);
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                I18nError::Storage(format!("Failed to read {}: {}", path.display(), e))
            })?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    I18nError::Storage(format!("Corrupted store {}: {}", path.display(), e))
                })?
            }
        } else {
            BTreeMap::new()
        };

        debug!("Opened store {} with {} entries", path.display(), entries.len());

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> I18nResult<()> {
        let json = serde_json::to_string(entries)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json).map_err(|e| {
            I18nError::Storage(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            I18nError::Storage(format!("Failed to replace {}: {}", self.path.display(), e))
        })
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> I18nResult<Option<String>> {
        Ok(lock(&self.entries)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> I18nResult<()> {
        let mut entries = lock(&self.entries)?;
        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.flush(&entries) {
            // Keep memory and disk in agreement.
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> I18nResult<()> {
        let mut entries = lock(&self.entries)?;
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    fn keys(&self, prefix: &str) -> I18nResult<Vec<String>> {
        Ok(lock(&self.entries)?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Open a named store under `dir`, or an in-memory one when `dir` is `None`.
pub fn open_store(dir: Option<&Path>, name: &str) -> I18nResult<Arc<dyn KvStore>> {
    match dir {
        Some(dir) => Ok(Arc::new(FileStore::open(dir, name)?)),
        None => Ok(MemoryStore::shared()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Store whose writes can be switched off to simulate an unavailable medium.
    #[derive(Default)]
    pub struct FlakyStore {
        inner: MemoryStore,
        pub fail_writes: AtomicBool,
        pub fail_reads: AtomicBool,
    }

    impl FlakyStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        pub fn set_fail_reads(&self, fail: bool) {
            self.fail_reads.store(fail, Ordering::SeqCst);
        }
    }

    impl KvStore for FlakyStore {
        fn get(&self, key: &str) -> I18nResult<Option<String>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(I18nError::Storage("medium unavailable".to_string()));
            }
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> I18nResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(I18nError::Storage("quota exceeded".to_string()));
            }
            self.inner.set(key, value)
        }

        fn delete(&self, key: &str) -> I18nResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(I18nError::Storage("medium unavailable".to_string()));
            }
            self.inner.delete(key)
        }

        fn keys(&self, prefix: &str) -> I18nResult<Vec<String>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(I18nError::Storage("medium unavailable".to_string()));
            }
            self.inner.keys(prefix)
        }
    }
}
