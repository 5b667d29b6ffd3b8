//! The `metrics` module counts connected users.
//!
//! Counters are keyed by the hub's listen address so several hubs can share
//! one Redis instance. The hub resets its counter on start, increments it
//! per accepted connection, decrements it when the connection ends, and
//! periodically logs the total.

pub mod memory;
pub mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::utils::error::{HubError, HubResult};

#[async_trait]
pub trait MetricsHandler: Send + Sync {
    async fn reset_users(&self, addr: &str) -> HubResult<()>;

    async fn increment_users(&self, addr: &str) -> HubResult<()>;

    async fn decrement_users(&self, addr: &str) -> HubResult<()>;

    /// Total number of connected users across every hub sharing the backend.
    async fn nb_users(&self) -> HubResult<u64>;
}

#[async_trait]
pub trait MetricsFactory: Send + Sync {
    fn supports(&self, dsn: &Url) -> bool;

    async fn create(&self, dsn: &Url) -> HubResult<Arc<dyn MetricsHandler>>;
}

pub fn factories() -> Vec<Box<dyn MetricsFactory>> {
    vec![
        Box::new(redis::RedisMetricsFactory),
        Box::new(memory::MemoryMetricsFactory),
    ]
}

pub async fn create_metrics(dsn: &str) -> HubResult<Arc<dyn MetricsHandler>> {
    let url = Url::parse(dsn).map_err(|e| HubError::InvalidDsn(format!("{dsn}: {e}")))?;
    for factory in factories() {
        if factory.supports(&url) {
            return factory.create(&url).await;
        }
    }
    Err(HubError::InvalidDsn(format!("no metrics handler supports \"{dsn}\"")))
}

#[cfg(test)]
mod tests;
