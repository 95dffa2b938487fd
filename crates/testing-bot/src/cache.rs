//! Redis connection opened during startup

use redis::aio::MultiplexedConnection;

use crate::{prelude::*, util::rate_limit::RateLimitParams};

#[derive(Debug, clap::Args)]
pub struct CacheOpts {
    /// Redis server to connect to
    #[arg(long, env, default_value = "redis://127.0.0.1")]
    redis_url: Url,
}

/// Shared handle to the Redis server
#[derive(Clone)]
pub struct Cache {
    conn: MultiplexedConnection,
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache").finish_non_exhaustive()
    }
}

impl Cache {
    /// Connect once; there is no reconnect policy beyond what the multiplexed
    /// connection does internally
    #[instrument(level = "error", name = "open_cache", skip(opts), fields(url = %opts.redis_url))]
    pub async fn open(opts: &CacheOpts) -> Result<Self> {
        let client = redis::Client::open(opts.redis_url.as_str())
            .context("Invalid Redis connection info")?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .context("Error connecting to Redis")?;

        info!("Connected to Redis server");
        Ok(Self { conn })
    }

    /// Count a request against `key`, returning whether it is allowed
    pub async fn rate_limit<K: fmt::Display + ?Sized>(
        &self,
        params: RateLimitParams,
        key: &K,
    ) -> Result<bool> {
        params.check(key, self.conn.clone()).await
    }
}
