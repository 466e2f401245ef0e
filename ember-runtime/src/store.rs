//! File-backed persistent stores.
//!
//! Two primitives: `PersistentStore`, a keyed map persisted as one JSON file
//! per store (atomic temp-file + rename writes), and `AppendLog`, an
//! append-only JSON-lines file for the credits ledger and the audit trail.
//!
//! `update_if` is the compare-and-set every lifecycle writer must use:
//! heartbeats, the provisioner and the reconciliation jobs all race on the
//! same row, and a writer whose expectation went stale has to degrade to a
//! no-op rather than clobber a concurrent transition.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{EmberError, Result};

/// Outcome of a conditional update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CasOutcome {
    /// The predicate held and the mutation was applied and persisted.
    Applied,
    /// The predicate no longer held; nothing was written.
    Skipped,
}

/// Resolve the state directory, creating it with owner-only permissions.
pub fn ensure_state_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .map_err(|err| EmberError::Storage(format!("failed to create {dir:?}: {err}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dir, fs::Permissions::from_mode(0o700)).ok();
        }
    }
    Ok(())
}

/// Keyed map persisted as a single JSON file.
pub struct PersistentStore<V> {
    path: PathBuf,
    map: Mutex<HashMap<String, V>>,
}

impl<V> PersistentStore<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    pub fn open(path: PathBuf) -> Result<Self> {
        let map = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|err| EmberError::Storage(format!("corrupt store {path:?}: {err}")))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                return Err(EmberError::Storage(format!("failed to read {path:?}: {err}")));
            }
        };
        Ok(Self {
            path,
            map: Mutex::new(map),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, V>>> {
        self.map
            .lock()
            .map_err(|_| EmberError::Storage("store poisoned".into()))
    }

    fn persist(&self, map: &HashMap<String, V>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(map)
            .map_err(|err| EmberError::Storage(format!("serialize failed: {err}")))?;
        let tmp = self.path.with_extension("tmp");
        let mut file = fs::File::create(&tmp)
            .map_err(|err| EmberError::Storage(format!("failed to create {tmp:?}: {err}")))?;
        file.write_all(&bytes)
            .and_then(|_| file.sync_all())
            .map_err(|err| EmberError::Storage(format!("failed to write {tmp:?}: {err}")))?;
        fs::rename(&tmp, &self.path)
            .map_err(|err| EmberError::Storage(format!("failed to commit {:?}: {err}", self.path)))
    }

    pub fn get(&self, key: &str) -> Result<Option<V>> {
        Ok(self.lock()?.get(key).cloned())
    }

    pub fn find<F>(&self, predicate: F) -> Result<Option<V>>
    where
        F: Fn(&V) -> bool,
    {
        Ok(self.lock()?.values().find(|v| predicate(v)).cloned())
    }

    pub fn values(&self) -> Result<Vec<V>> {
        Ok(self.lock()?.values().cloned().collect())
    }

    pub fn insert(&self, key: String, value: V) -> Result<()> {
        let mut map = self.lock()?;
        map.insert(key, value);
        self.persist(&map)
    }

    pub fn remove(&self, key: &str) -> Result<Option<V>> {
        let mut map = self.lock()?;
        let removed = map.remove(key);
        if removed.is_some() {
            self.persist(&map)?;
        }
        Ok(removed)
    }

    /// Unconditional read-modify-write. Returns false if the key is absent.
    pub fn update<F>(&self, key: &str, f: F) -> Result<bool>
    where
        F: FnOnce(&mut V),
    {
        let mut map = self.lock()?;
        match map.get_mut(key) {
            Some(value) => {
                f(value);
                self.persist(&map)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Compare-and-set: apply the mutation only while the predicate still
    /// holds under the store lock. A stale writer gets `Skipped` back and
    /// must not retry blindly.
    pub fn update_if<P, F>(&self, key: &str, predicate: P, f: F) -> Result<CasOutcome>
    where
        P: FnOnce(&V) -> bool,
        F: FnOnce(&mut V),
    {
        let mut map = self.lock()?;
        let value = map
            .get_mut(key)
            .ok_or_else(|| EmberError::NotFound(format!("no row for key {key}")))?;
        if !predicate(value) {
            return Ok(CasOutcome::Skipped);
        }
        f(value);
        self.persist(&map)?;
        Ok(CasOutcome::Applied)
    }
}

/// Append-only JSON-lines file.
pub struct AppendLog {
    path: PathBuf,
    write: Mutex<()>,
}

impl AppendLog {
    pub fn open(path: PathBuf) -> Result<Self> {
        Ok(Self {
            path,
            write: Mutex::new(()),
        })
    }

    pub fn append<V: Serialize>(&self, entry: &V) -> Result<()> {
        let _guard = self
            .write
            .lock()
            .map_err(|_| EmberError::Storage("log poisoned".into()))?;
        let mut line = serde_json::to_vec(entry)
            .map_err(|err| EmberError::Storage(format!("serialize failed: {err}")))?;
        line.push(b'\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| EmberError::Storage(format!("failed to open {:?}: {err}", self.path)))?;
        file.write_all(&line)
            .map_err(|err| EmberError::Storage(format!("failed to append {:?}: {err}", self.path)))
    }

    pub fn entries<V: DeserializeOwned>(&self) -> Result<Vec<V>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(EmberError::Storage(format!(
                    "failed to read {:?}: {err}",
                    self.path
                )));
            }
        };
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .map_err(|err| EmberError::Storage(format!("corrupt log line: {err}")))
            })
            .collect()
    }
}
