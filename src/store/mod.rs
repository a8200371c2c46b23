//! Device-session store.
//!
//! Records live in a key-value cache under
//! `{device_namespace}:{plan_id}:{dev_eui}`. Every DevAddr a record uses (its
//! own and its pending-rejoin's) has a set `{devaddr_namespace}:{dev_addr}` of
//! the DevEUIs currently using it. All keys share one TTL that every save
//! refreshes.
//!
//! The primary write and the index writes are separate commands. A failed
//! index write after a successful primary write does not fail the save; it is
//! reported through [`SaveOutcome::index_error`].

pub mod memory;
pub mod redis;

use std::time::Duration;

use thiserror::Error;

use crate::lorawan::{DevAddr, Eui64};
use crate::session::{self, CodecError, SessionRecord};

pub use memory::MemoryKv;
pub use self::redis::RedisKv;

/// Errors raised by a key-value backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The server could not be reached or the connection dropped.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server rejected the credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A command failed on the server.
    #[error("command error: {0}")]
    Command(String),
}

impl BackendError {
    /// Whether retrying can help.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// The operations the store needs from a key-value cache.
pub trait KvBackend: Send + Sync {
    /// Value at `key`, `None` when absent or expired.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    /// Replace the value at `key` and set its expiry.
    fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), BackendError>;

    /// Add `member` to the set at `key` and reset the set's expiry.
    fn add_to_set_with_ttl(&self, key: &str, member: &[u8], ttl: Duration) -> Result<(), BackendError>;

    /// Members of the set at `key`, empty when absent.
    fn set_members(&self, key: &str) -> Result<Vec<Vec<u8>>, BackendError>;

    /// Remove `key`. Absent keys are not an error.
    fn delete(&self, key: &str) -> Result<(), BackendError>;
}

/// Session store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record for the device.
    #[error("device-session for {0} does not exist")]
    NotFound(Eui64),

    /// Stored bytes could not be decoded.
    #[error("device-session for {dev_eui} is unreadable: {source}")]
    Decode {
        /// Device whose record is broken
        dev_eui: Eui64,
        /// Codec failure
        #[source]
        source: CodecError,
    },

    /// The record could not be encoded.
    #[error("device-session for {dev_eui} cannot be encoded: {source}")]
    Encode {
        /// Device being saved
        dev_eui: Eui64,
        /// Codec failure
        #[source]
        source: CodecError,
    },

    /// The backend failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Result of a successful primary write.
#[derive(Debug, Default)]
#[must_use]
pub struct SaveOutcome {
    /// First index-set write failure, if any.
    pub index_error: Option<BackendError>,
}

impl SaveOutcome {
    /// Whether every index write also succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.index_error.is_none()
    }
}

/// Key prefixes of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    /// Prefix of record keys, e.g. `lora:ns:device`.
    pub device_namespace: String,
    /// Prefix of address index keys, e.g. `lora:ns:devaddr`.
    pub devaddr_namespace: String,
    /// Active channel-plan identifier.
    pub plan_id: String,
}

impl KeyLayout {
    /// Key of the record for `dev_eui`.
    #[must_use]
    pub fn device_key(&self, dev_eui: &Eui64) -> String {
        format!("{}:{}:{}", self.device_namespace, self.plan_id, dev_eui)
    }

    /// Key of the DevEUI set for `dev_addr`.
    #[must_use]
    pub fn devaddr_key(&self, dev_addr: &DevAddr) -> String {
        format!("{}:{}", self.devaddr_namespace, dev_addr)
    }

    /// Key of the pending MAC-command queue of `dev_eui`.
    #[must_use]
    pub fn mac_queue_key(&self, dev_eui: &Eui64) -> String {
        format!("{}:{}:mac:queue", self.device_namespace, dev_eui)
    }
}

/// Typed access to device-sessions over a [`KvBackend`].
pub struct SessionStore {
    backend: Box<dyn KvBackend>,
    keys: KeyLayout,
    ttl: Duration,
}

impl SessionStore {
    /// Create a store over `backend`.
    #[must_use]
    pub fn new(backend: Box<dyn KvBackend>, keys: KeyLayout, ttl: Duration) -> Self {
        Self { backend, keys, ttl }
    }

    /// Key layout in use.
    #[must_use]
    pub fn keys(&self) -> &KeyLayout {
        &self.keys
    }

    /// TTL applied on save.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Load the record of `dev_eui`.
    pub fn get(&self, dev_eui: &Eui64) -> Result<SessionRecord, StoreError> {
        let key = self.keys.device_key(dev_eui);
        let bytes = self
            .backend
            .get(&key)?
            .ok_or(StoreError::NotFound(*dev_eui))?;
        session::decode(&bytes).map_err(|source| StoreError::Decode {
            dev_eui: *dev_eui,
            source,
        })
    }

    /// Write `record` and refresh the address index.
    ///
    /// Errors only when the record cannot be encoded or the primary write
    /// fails. Index failures come back in the [`SaveOutcome`].
    pub fn save(&self, record: &SessionRecord) -> Result<SaveOutcome, StoreError> {
        let bytes = session::encode(record).map_err(|source| StoreError::Encode {
            dev_eui: record.dev_eui,
            source,
        })?;

        self.backend
            .set_with_ttl(&self.keys.device_key(&record.dev_eui), &bytes, self.ttl)?;

        let mut addrs = vec![record.dev_addr];
        if let Some(pending) = record.pending_rejoin.as_deref() {
            if pending.dev_addr != record.dev_addr {
                addrs.push(pending.dev_addr);
            }
        }

        let mut outcome = SaveOutcome::default();
        for addr in addrs {
            let key = self.keys.devaddr_key(&addr);
            if let Err(e) = self
                .backend
                .add_to_set_with_ttl(&key, record.dev_eui.as_bytes(), self.ttl)
            {
                log::warn!(
                    "dev_eui={} devaddr index {} not updated: {}",
                    record.dev_eui,
                    key,
                    e
                );
                if outcome.index_error.is_none() {
                    outcome.index_error = Some(e);
                }
            }
        }

        log::debug!("dev_eui={} device-session saved", record.dev_eui);
        Ok(outcome)
    }

    /// Drop queued MAC commands of `dev_eui`.
    pub fn flush_mac_command_queue(&self, dev_eui: &Eui64) -> Result<(), StoreError> {
        self.backend.delete(&self.keys.mac_queue_key(dev_eui))?;
        log::debug!("dev_eui={} mac-command queue flushed", dev_eui);
        Ok(())
    }

    /// DevEUIs indexed under `dev_addr`. Malformed members are skipped.
    pub fn device_ids_for_addr(&self, dev_addr: &DevAddr) -> Result<Vec<Eui64>, StoreError> {
        let members = self.backend.set_members(&self.keys.devaddr_key(dev_addr))?;
        Ok(members
            .iter()
            .filter_map(|m| Eui64::from_slice(m).ok())
            .collect())
    }
}
