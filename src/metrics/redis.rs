use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use url::Url;

use crate::metrics::{MetricsFactory, MetricsHandler};
use crate::utils::error::HubResult;
use crate::utils::redis::{connect, is_redis_dsn, open_client};

/// Key holding the user count of the hub listening on `addr`.
pub fn users_key(addr: &str) -> String {
    format!("users:{addr}")
}

/// Per-hub counters stored under `users:<addr>`.
pub struct RedisMetrics {
    conn: MultiplexedConnection,
}

impl RedisMetrics {
    pub async fn connect(dsn: &Url) -> HubResult<Self> {
        let client = open_client(dsn)?;
        Ok(Self {
            conn: connect(&client).await?,
        })
    }
}

#[async_trait]
impl MetricsHandler for RedisMetrics {
    async fn reset_users(&self, addr: &str) -> HubResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(users_key(addr), 0).await?;
        Ok(())
    }

    async fn increment_users(&self, addr: &str) -> HubResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.incr(users_key(addr), 1).await?;
        Ok(())
    }

    async fn decrement_users(&self, addr: &str) -> HubResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.decr(users_key(addr), 1).await?;
        Ok(())
    }

    async fn nb_users(&self) -> HubResult<u64> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(users_key("*")).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let counts: Vec<Option<i64>> = conn.mget(keys).await?;
        let total: i64 = counts.into_iter().flatten().sum();
        Ok(total.max(0) as u64)
    }
}

/// Handles `redis://` and `rediss://` DSNs.
pub struct RedisMetricsFactory;

#[async_trait]
impl MetricsFactory for RedisMetricsFactory {
    fn supports(&self, dsn: &Url) -> bool {
        is_redis_dsn(dsn)
    }

    async fn create(&self, dsn: &Url) -> HubResult<Arc<dyn MetricsHandler>> {
        Ok(Arc::new(RedisMetrics::connect(dsn).await?))
    }
}
