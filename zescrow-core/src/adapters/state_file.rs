//! JSON state shared between processes
//!
//! The simulated chain backends keep their whole state in a single JSON
//! document. Every mutation runs as load, modify, write under an exclusive
//! `fs2` lock so the API server and one-shot CLI invocations never clobber
//! each other. A failed mutation leaves the stored state untouched.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::result::{Error, Result};

pub struct JsonStore<T> {
    path: Option<PathBuf>,
    /// In-memory state; with a backing file this only serializes threads
    memory: Mutex<T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default + Clone,
{
    /// State that lives and dies with the process
    pub fn in_memory() -> Self {
        Self {
            path: None,
            memory: Mutex::new(T::default()),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path: Some(path.to_path_buf()),
            memory: Mutex::new(T::default()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let memory = self
            .memory
            .lock()
            .map_err(|e| Error::Other(format!("Lock poisoned: {}", e)))?;

        match &self.path {
            None => Ok(f(&memory)),
            Some(path) => {
                let lock = self.lock_file(path)?;
                lock.lock_shared()?;
                let state = Self::load(path);
                lock.unlock()?;
                Ok(f(&state?))
            }
        }
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> Result<R>) -> Result<R> {
        let mut memory = self
            .memory
            .lock()
            .map_err(|e| Error::Other(format!("Lock poisoned: {}", e)))?;

        match &self.path {
            None => {
                let mut draft = memory.clone();
                let out = f(&mut draft)?;
                *memory = draft;
                Ok(out)
            }
            Some(path) => {
                let lock = self.lock_file(path)?;
                lock.lock_exclusive()?;
                let result = Self::load(path).and_then(|mut state| {
                    let out = f(&mut state)?;
                    Self::store(path, &state)?;
                    Ok(out)
                });
                lock.unlock()?;
                result
            }
        }
    }

    fn lock_file(&self, path: &Path) -> Result<File> {
        let lock_path = path.with_extension("lock");
        Ok(OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(lock_path)?)
    }

    fn load(path: &Path) -> Result<T> {
        if !path.exists() {
            return Ok(T::default());
        }
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(T::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    /// Write to a sibling temp file, then rename over the original
    fn store(path: &Path, state: &T) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(state)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    type Counters = BTreeMap<String, i64>;

    #[test]
    fn test_file_state_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store: JsonStore<Counters> = JsonStore::open(&path).unwrap();
        store
            .update(|s| {
                s.insert("a".into(), 1);
                Ok(())
            })
            .unwrap();

        let reopened: JsonStore<Counters> = JsonStore::open(&path).unwrap();
        assert_eq!(reopened.read(|s| s.get("a").copied()).unwrap(), Some(1));
    }

    #[test]
    fn test_failed_update_is_discarded() {
        let dir = tempdir().unwrap();
        for store in [
            JsonStore::<Counters>::in_memory(),
            JsonStore::<Counters>::open(&dir.path().join("s.json")).unwrap(),
        ] {
            let result: Result<()> = store.update(|s| {
                s.insert("half".into(), 1);
                Err(Error::validation("nope"))
            });
            assert!(result.is_err());
            assert!(store.read(|s| s.is_empty()).unwrap());
        }
    }
}
