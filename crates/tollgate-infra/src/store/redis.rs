//! Redis state store. Compound operations run as Lua scripts so each one is a
//! single atomic step on the server.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, Script};

use tollgate_core::ports::{StateStore, StoreError, WindowAdmission, WindowOutcome};

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Whether to fall back to the in-memory store if Redis is unavailable at startup
    pub fallback_to_memory: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            fallback_to_memory: true,
        }
    }
}

impl RedisConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(
                std::env::var("REDIS_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            fallback_to_memory: std::env::var("REDIS_FALLBACK_TO_MEMORY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        }
    }
}

// KEYS[1] window set
// ARGV: window_start_ms, now_ms, member, max_requests, ttl_ms
// Returns: {admitted (0|1), members in window}
const SLIDING_WINDOW_ADMIT: &str = r#"
local key = KEYS[1]
redis.call('ZREMRANGEBYSCORE', key, '-inf', '(' .. ARGV[1])

if redis.call('ZSCORE', key, ARGV[3]) then
    return {1, redis.call('ZCARD', key)}
end

local count = redis.call('ZCOUNT', key, ARGV[1], ARGV[2])
if count >= tonumber(ARGV[4]) then
    return {0, count}
end

redis.call('ZADD', key, ARGV[2], ARGV[3])
redis.call('PEXPIRE', key, ARGV[5])
return {1, count + 1}
"#;

// KEYS[1] state key
// ARGV: has_expected (0|1), expected, value, ttl_ms
const COMPARE_AND_SET: &str = r#"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '1' then
    if current ~= ARGV[2] then
        return 0
    end
elseif current then
    return 0
end

redis.call('SET', KEYS[1], ARGV[3], 'PX', ARGV[4])
return 1
"#;

// KEYS[1] counter key, ARGV[1] ttl_ms
const INCREMENT: &str = r#"
local value = redis.call('INCR', KEYS[1])
redis.call('PEXPIRE', KEYS[1], ARGV[1])
return value
"#;

fn ttl_ms(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn map_err(err: RedisError) -> StoreError {
    if err.is_timeout()
        || err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
    {
        StoreError::Unavailable(err.to_string())
    } else {
        StoreError::Operation(err.to_string())
    }
}

/// Redis-backed shared state store.
///
/// Uses connection manager for automatic reconnection. Per-call deadlines are
/// applied by the limiter, not here.
pub struct RedisStateStore {
    conn: ConnectionManager,
    sliding_window_admit: Script,
    compare_and_set: Script,
    increment: Script,
}

impl RedisStateStore {
    pub async fn new(config: &RedisConfig) -> Result<Self, StoreError> {
        let client =
            Client::open(config.url.as_str()).map_err(|e| StoreError::Operation(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn_manager_fut = ConnectionManager::new(client);
        let conn = tokio::time::timeout(config.connect_timeout, conn_manager_fut)
            .await
            .map_err(|_| StoreError::Timeout(config.connect_timeout))?
            .map_err(map_err)?;

        tracing::info!(url = %config.url, "Connected to Redis state store");

        Ok(Self {
            conn,
            sliding_window_admit: Script::new(SLIDING_WINDOW_ADMIT),
            compare_and_set: Script::new(COMPARE_AND_SET),
            increment: Script::new(INCREMENT),
        })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, StoreError> {
        Self::new(&RedisConfig::from_env()).await
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_ms(ttl))
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let written: i64 = self
            .compare_and_set
            .key(key)
            .arg(if expected.is_some() { "1" } else { "0" })
            .arg(expected.unwrap_or(""))
            .arg(value)
            .arg(ttl_ms(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(written == 1)
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let value: i64 = self
            .increment
            .key(key)
            .arg(ttl_ms(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(value)
    }

    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn zrem_range_by_score(&self, key: &str, min: i64, max: i64) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg(min)
            .arg(max)
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(removed)
    }

    async fn zcount(&self, key: &str, min: i64, max: i64) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let count: u64 = redis::cmd("ZCOUNT")
            .arg(key)
            .arg(min)
            .arg(max)
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(count)
    }

    async fn zmax_score(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn.clone();
        // [member, score] or empty
        let top: Vec<String> = redis::cmd("ZREVRANGE")
            .arg(key)
            .arg(0)
            .arg(0)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;

        match top.get(1) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<f64>()
                .map(|score| Some(score as i64))
                .map_err(|_| StoreError::Operation(format!("invalid score {raw:?} at {key}"))),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let updated: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_ms(ttl))
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(updated == 1)
    }

    async fn sliding_window_admit(
        &self,
        admission: &WindowAdmission<'_>,
    ) -> Result<WindowOutcome, StoreError> {
        let mut conn = self.conn.clone();
        let result: Vec<i64> = self
            .sliding_window_admit
            .key(admission.key)
            .arg(admission.window_start_ms)
            .arg(admission.now_ms)
            .arg(admission.member)
            .arg(admission.max_requests)
            .arg(ttl_ms(admission.ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(map_err)?;

        match result.as_slice() {
            [admitted, count] => Ok(WindowOutcome {
                admitted: *admitted == 1,
                count: (*count).max(0) as u64,
            }),
            other => Err(StoreError::Operation(format!(
                "unexpected sliding window reply {other:?}"
            ))),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(())
    }
}
