//! Redis backend over an r2d2 connection pool.

use std::time::Duration;

use redis::{Client, ErrorKind, RedisError};

use super::{BackendError, KvBackend};

/// Pooled Redis connections shared by every operation of a run.
pub struct RedisKv {
    pool: r2d2::Pool<Client>,
}

impl RedisKv {
    /// Open a pool of up to `pool_size` connections to `url`.
    ///
    /// One connection is opened and pinged up front so that unreachable
    /// servers and rejected credentials are told apart before the pool exists.
    pub fn connect(url: &str, pool_size: u32) -> Result<Self, BackendError> {
        let client = Client::open(url).map_err(map_redis_error)?;

        let mut probe = client.get_connection().map_err(map_redis_error)?;
        redis::cmd("PING")
            .query::<String>(&mut probe)
            .map_err(map_redis_error)?;
        drop(probe);

        let pool = r2d2::Pool::builder()
            .max_size(pool_size.max(1))
            .build(client)
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        log::debug!("redis pool ready ({} connection(s) max)", pool_size.max(1));
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<Client>, BackendError> {
        self.pool
            .get()
            .map_err(|e| BackendError::Connection(e.to_string()))
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn map_redis_error(e: RedisError) -> BackendError {
    if e.kind() == ErrorKind::AuthenticationFailed {
        BackendError::Authentication(e.to_string())
    } else if e.is_io_error()
        || e.is_connection_refusal()
        || e.is_connection_dropped()
        || e.is_timeout()
    {
        BackendError::Connection(e.to_string())
    } else {
        BackendError::Command(e.to_string())
    }
}

impl KvBackend for RedisKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let mut conn = self.conn()?;
        redis::cmd("GET")
            .arg(key)
            .query::<Option<Vec<u8>>>(&mut *conn)
            .map_err(map_redis_error)
    }

    fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), BackendError> {
        let mut conn = self.conn()?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query::<()>(&mut *conn)
            .map_err(map_redis_error)
    }

    fn add_to_set_with_ttl(&self, key: &str, member: &[u8], ttl: Duration) -> Result<(), BackendError> {
        let mut conn = self.conn()?;
        redis::pipe()
            .cmd("SADD")
            .arg(key)
            .arg(member)
            .ignore()
            .cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_millis(ttl))
            .ignore()
            .query::<()>(&mut *conn)
            .map_err(map_redis_error)
    }

    fn set_members(&self, key: &str) -> Result<Vec<Vec<u8>>, BackendError> {
        let mut conn = self.conn()?;
        redis::cmd("SMEMBERS")
            .arg(key)
            .query::<Vec<Vec<u8>>>(&mut *conn)
            .map_err(map_redis_error)
    }

    fn delete(&self, key: &str) -> Result<(), BackendError> {
        let mut conn = self.conn()?;
        redis::cmd("DEL")
            .arg(key)
            .query::<()>(&mut *conn)
            .map_err(map_redis_error)
    }
}
