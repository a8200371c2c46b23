//! Handles to every dependency of a run.
//!
//! A [`Context`] is built once at startup and passed to the restore, export
//! and import flows. Production code builds it with [`Context::connect`];
//! tests assemble one from in-memory parts with [`Context::new`].

use crate::config::{Config, NetworkSettings, RedisConfig};
use crate::connect::{connect_with_retry, ConnectError};
use crate::lorawan::band::Band;
use crate::sources::{FrameLog, IdentitySource, SqliteFrameLog, SqliteIdentityStore};
use crate::store::{RedisKv, SessionStore};

/// Dependencies shared by all flows.
pub struct Context {
    pub store: SessionStore,
    /// Older copy of the store, present for dump recovery.
    pub dump_store: Option<SessionStore>,
    pub identity: Box<dyn IdentitySource>,
    pub frame_log: Box<dyn FrameLog>,
    pub band: Band,
    pub network_settings: NetworkSettings,
}

impl Context {
    /// Assemble a context from ready parts.
    #[must_use]
    pub fn new(
        store: SessionStore,
        identity: Box<dyn IdentitySource>,
        frame_log: Box<dyn FrameLog>,
        band: Band,
        network_settings: NetworkSettings,
    ) -> Self {
        Self {
            store,
            dump_store: None,
            identity,
            frame_log,
            band,
            network_settings,
        }
    }

    /// Attach the secondary store used by dump recovery.
    #[must_use]
    pub fn with_dump_store(mut self, dump_store: SessionStore) -> Self {
        self.dump_store = Some(dump_store);
        self
    }

    /// Connect to every dependency named in `config`.
    ///
    /// Each connection is retried per `[connect]`. `with_dump` additionally
    /// connects the `[dump_redis]` store, which must then be configured.
    pub fn connect(config: &Config, band: Band, with_dump: bool) -> anyhow::Result<Self> {
        let store = connect_store(config, &band)?;

        let dump_store = if with_dump {
            Some(connect_dump_store(config, &band)?)
        } else {
            None
        };

        let identity = connect_identity(config)?;
        let policy = config.retry_policy();
        let frame_log = connect_with_retry("frame log", &policy, || {
            SqliteFrameLog::open(&config.frame_log.database)
        })?;

        Ok(Self {
            store,
            dump_store,
            identity: Box::new(identity),
            frame_log: Box::new(frame_log),
            band,
            network_settings: config.network_server.network_settings.clone(),
        })
    }
}

fn redis_store(
    name: &str,
    redis: &RedisConfig,
    config: &Config,
    band: &Band,
) -> Result<SessionStore, ConnectError> {
    let kv = connect_with_retry(name, &config.retry_policy(), || {
        RedisKv::connect(&redis.url, redis.pool_size)
    })?;
    Ok(SessionStore::new(
        Box::new(kv),
        config.key_layout(band),
        config.session_ttl(),
    ))
}

/// Connect the primary session store.
pub fn connect_store(config: &Config, band: &Band) -> Result<SessionStore, ConnectError> {
    redis_store("redis", &config.redis, config, band)
}

/// Connect the `[dump_redis]` store.
pub fn connect_dump_store(config: &Config, band: &Band) -> Result<SessionStore, ConnectError> {
    let dump = config.dump_redis.as_ref().ok_or_else(|| ConnectError::Fatal {
        name: "dump_redis".into(),
        reason: "no [dump_redis] section configured".into(),
    })?;
    redis_store("dump_redis", dump, config, band)
}

/// Open the application-server and network-server databases.
pub fn connect_identity(config: &Config) -> Result<SqliteIdentityStore, ConnectError> {
    connect_with_retry("server databases", &config.retry_policy(), || {
        SqliteIdentityStore::open(
            &config.application_server.database,
            &config.network_server.database,
        )
    })
}
