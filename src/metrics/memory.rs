use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use url::Url;

use crate::metrics::{MetricsFactory, MetricsHandler};
use crate::utils::error::HubResult;

/// Process-local user counter. The address is ignored: one process, one hub.
#[derive(Debug, Default)]
pub struct MemoryMetrics {
    users: AtomicU64,
}

impl MemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetricsHandler for MemoryMetrics {
    async fn reset_users(&self, _addr: &str) -> HubResult<()> {
        self.users.store(0, Ordering::SeqCst);
        Ok(())
    }

    async fn increment_users(&self, _addr: &str) -> HubResult<()> {
        self.users.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn decrement_users(&self, _addr: &str) -> HubResult<()> {
        let _ = self
            .users
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        Ok(())
    }

    async fn nb_users(&self) -> HubResult<u64> {
        Ok(self.users.load(Ordering::SeqCst))
    }
}

/// Handles `php://`, `memory://` and `null://` DSNs.
pub struct MemoryMetricsFactory;

#[async_trait]
impl MetricsFactory for MemoryMetricsFactory {
    fn supports(&self, dsn: &Url) -> bool {
        matches!(dsn.scheme(), "php" | "memory" | "null")
    }

    async fn create(&self, _dsn: &Url) -> HubResult<Arc<dyn MetricsHandler>> {
        Ok(Arc::new(MemoryMetrics::new()))
    }
}
