//! In-process key-value backend with expiry.
//!
//! Clones share the same data, so a test can keep a handle while the store
//! owns another.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{BackendError, KvBackend};

#[derive(Debug, Clone)]
enum Value {
    Bytes(Vec<u8>),
    Set(BTreeSet<Vec<u8>>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    fail_reads: bool,
    fail_set_writes: bool,
}

/// Shared in-memory [`KvBackend`].
#[derive(Debug, Clone, Default)]
pub struct MemoryKv {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryKv {
    /// Empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, BackendError> {
        self.inner
            .lock()
            .map_err(|_| BackendError::Command("memory backend lock poisoned".into()))
    }

    /// Remaining lifetime of `key`, `None` when absent or without expiry.
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let inner = self.lock().ok()?;
        let now = Instant::now();
        inner
            .entries
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .map(|inner| inner.entries.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    /// Whether no live keys remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .lock()
            .map(|inner| {
                inner
                    .entries
                    .iter()
                    .filter(|(_, e)| e.is_live(now))
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Make every `get` fail with a connection error.
    pub fn fail_reads(&self, fail: bool) {
        if let Ok(mut inner) = self.lock() {
            inner.fail_reads = fail;
        }
    }

    /// Make every set-add fail with a command error.
    pub fn fail_set_writes(&self, fail: bool) {
        if let Ok(mut inner) = self.lock() {
            inner.fail_set_writes = fail;
        }
    }
}

impl KvBackend for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let inner = self.lock()?;
        if inner.fail_reads {
            return Err(BackendError::Connection("read refused".into()));
        }
        match inner.entries.get(key) {
            Some(e) if e.is_live(Instant::now()) => match &e.value {
                Value::Bytes(b) => Ok(Some(b.clone())),
                Value::Set(_) => Err(BackendError::Command(format!(
                    "WRONGTYPE {key} holds a set"
                ))),
            },
            _ => Ok(None),
        }
    }

    fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), BackendError> {
        let mut inner = self.lock()?;
        inner.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Bytes(value.to_vec()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    fn add_to_set_with_ttl(&self, key: &str, member: &[u8], ttl: Duration) -> Result<(), BackendError> {
        let mut inner = self.lock()?;
        if inner.fail_set_writes {
            return Err(BackendError::Command(format!("SADD {key} refused")));
        }
        let now = Instant::now();
        let expires_at = Some(now + ttl);
        let entry = inner.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(BTreeSet::new()),
            expires_at,
        });
        if !entry.is_live(now) {
            entry.value = Value::Set(BTreeSet::new());
        }
        match &mut entry.value {
            Value::Set(set) => {
                set.insert(member.to_vec());
            }
            Value::Bytes(_) => {
                return Err(BackendError::Command(format!("WRONGTYPE {key} holds a string")));
            }
        }
        entry.expires_at = expires_at;
        Ok(())
    }

    fn set_members(&self, key: &str) -> Result<Vec<Vec<u8>>, BackendError> {
        let inner = self.lock()?;
        match inner.entries.get(key) {
            Some(e) if e.is_live(Instant::now()) => match &e.value {
                Value::Set(set) => Ok(set.iter().cloned().collect()),
                Value::Bytes(_) => Err(BackendError::Command(format!(
                    "WRONGTYPE {key} holds a string"
                ))),
            },
            _ => Ok(Vec::new()),
        }
    }

    fn delete(&self, key: &str) -> Result<(), BackendError> {
        self.lock()?.entries.remove(key);
        Ok(())
    }
}
