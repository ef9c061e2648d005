//! Redis-backed token accounting shared across processes

use super::backend::TokenBackend;
use super::types::RateLimitConfig;
use crate::utils::error::{DispatchError, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, Script};
use tracing::{debug, error, info};

/// Refill and optionally consume in one atomic step, timed by the server clock
///
/// Returns `{tokens, granted}`; tokens as a string because Lua numbers are
/// truncated to integers on the way out.
const BUCKET_SCRIPT: &str = r#"
local rate = tonumber(ARGV[1])
local burst = tonumber(ARGV[2])
local requested = tonumber(ARGV[3])
local mode = ARGV[4]

local clock = redis.call('TIME')
local now = tonumber(clock[1]) + tonumber(clock[2]) / 1000000

local state = redis.call('HMGET', KEYS[1], 'tokens', 'ts')
local tokens = tonumber(state[1])
local ts = tonumber(state[2])
if tokens == nil or ts == nil then
  tokens = burst
  ts = now
end

tokens = math.min(burst, tokens + math.max(0, now - ts) * rate)
if mode == 'get' then
  return {tostring(tokens), 0}
end

local granted = 0
if mode == 'consume' and tokens >= requested then
  tokens = tokens - requested
  granted = 1
end

redis.call('HSET', KEYS[1], 'tokens', tostring(tokens), 'ts', tostring(now))
redis.call('EXPIRE', KEYS[1], math.max(1, math.ceil(burst / rate) * 2))
return {tostring(tokens), granted}
"#;

/// Token buckets stored in Redis hashes under `<prefix>:<group>`
#[derive(Clone)]
pub struct RedisTokenBackend {
    connection: MultiplexedConnection,
    script: Script,
    prefix: String,
}

impl RedisTokenBackend {
    /// Connect to `url`; every clone shares one multiplexed connection
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| DispatchError::invalid_config(format!("Invalid Redis URL: {}", e)))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                DispatchError::invalid_config(format!("Failed to connect to Redis: {}", e))
            })?;

        info!("Redis token backend connected");
        Ok(Self::from_connection(connection, prefix))
    }

    pub fn from_connection(connection: MultiplexedConnection, prefix: impl Into<String>) -> Self {
        Self {
            connection,
            script: Script::new(BUCKET_SCRIPT),
            prefix: prefix.into(),
        }
    }

    async fn run(
        &self,
        group: &str,
        config: &RateLimitConfig,
        n: f64,
        mode: &str,
    ) -> Result<(f64, bool)> {
        let mut connection = self.connection.clone();
        debug!(group, mode, "running bucket script");
        let (tokens, granted): (String, i64) = self
            .script
            .key(format!("{}:{}", self.prefix, group))
            .arg(config.rate)
            .arg(config.burst)
            .arg(n)
            .arg(mode)
            .invoke_async(&mut connection)
            .await
            .map_err(|e| {
                error!(group, "Redis token backend failed: {}", e);
                DispatchError::ConnectionFailed {
                    endpoint: "redis".to_string(),
                    group: group.to_string(),
                    message: e.to_string(),
                }
            })?;

        let tokens = tokens.parse::<f64>().unwrap_or(0.0).min(config.burst as f64);
        Ok((tokens, granted == 1))
    }
}

#[async_trait]
impl TokenBackend for RedisTokenBackend {
    async fn get_tokens(&self, group: &str, config: &RateLimitConfig) -> Result<f64> {
        self.run(group, config, 0.0, "get").await.map(|(tokens, _)| tokens)
    }

    async fn consume_tokens(&self, group: &str, config: &RateLimitConfig, n: f64) -> Result<bool> {
        self.run(group, config, n, "consume").await.map(|(_, granted)| granted)
    }

    async fn refill_tokens(&self, group: &str, config: &RateLimitConfig) -> Result<f64> {
        self.run(group, config, 0.0, "refill").await.map(|(tokens, _)| tokens)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
