use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::broker::message::Message;
use crate::broker::subscription::Subscription;
use crate::persistence::{
    CLOSED_SUBSCRIPTIONS_LIMIT, EARLIEST, Storage, StorageFactory, history_size,
    subscription_filter,
};
use crate::security::matcher::matches_selectors;
use crate::utils::error::{HubError, HubResult};

/// In-process storage: a FIFO history of at most `capacity` messages and an
/// ordered subscription registry.
///
/// A capacity of `0` disables history entirely; the registry is kept.
#[derive(Debug)]
pub struct MemoryStorage {
    capacity: usize,
    history: Mutex<VecDeque<(String, Message)>>,
    subscriptions: Mutex<Registry>,
}

/// Active subscriptions plus the most recently closed ones.
#[derive(Debug)]
struct Registry {
    active: Vec<Subscription>,
    closed: VecDeque<Subscription>,
    closed_limit: usize,
}

impl Registry {
    fn remove(&mut self, id: &str) {
        self.active.retain(|s| s.id != id);
        self.closed.retain(|s| s.id != id);
    }

    fn store(&mut self, subscription: &Subscription) {
        if subscription.active {
            match self.active.iter_mut().find(|s| s.id == subscription.id) {
                Some(existing) => *existing = subscription.clone(),
                None => {
                    self.closed.retain(|s| s.id != subscription.id);
                    self.active.push(subscription.clone());
                }
            }
            return;
        }

        self.remove(&subscription.id);
        if self.closed_limit == 0 {
            return;
        }
        while self.closed.len() >= self.closed_limit {
            self.closed.pop_front();
        }
        self.closed.push_back(subscription.clone());
    }

    fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.active.iter().chain(self.closed.iter())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> HubResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| HubError::Backend("storage lock poisoned".to_string()))
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(0)
    }
}

impl MemoryStorage {
    pub fn new(capacity: usize) -> Self {
        Self::with_closed_limit(capacity, CLOSED_SUBSCRIPTIONS_LIMIT)
    }

    /// Like [`MemoryStorage::new`], keeping at most `closed_limit` inactive subscriptions.
    pub fn with_closed_limit(capacity: usize, closed_limit: usize) -> Self {
        Self {
            capacity,
            history: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            subscriptions: Mutex::new(Registry {
                active: Vec::new(),
                closed: VecDeque::new(),
                closed_limit,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn last_event_id(&self) -> HubResult<Option<String>> {
        Ok(lock(&self.history)?.back().map(|(_, m)| m.id.clone()))
    }

    async fn retrieve_messages_after_id(
        &self,
        id: &str,
        selectors: &[String],
    ) -> HubResult<Vec<(String, Message)>> {
        let history = lock(&self.history)?;
        let start = if id == EARLIEST {
            0
        } else {
            match history.iter().position(|(_, m)| m.id == id) {
                Some(index) => index + 1,
                None => return Ok(Vec::new()),
            }
        };

        Ok(history
            .iter()
            .skip(start)
            .filter(|(topic, _)| matches_selectors(topic, selectors))
            .cloned()
            .collect())
    }

    async fn store_message(&self, topic: &str, message: &Message) -> HubResult<()> {
        if self.capacity == 0 {
            return Ok(());
        }

        let mut history = lock(&self.history)?;
        while history.len() >= self.capacity {
            history.pop_front();
        }
        history.push_back((topic.to_string(), message.clone()));
        Ok(())
    }

    async fn store_subscriptions(&self, subscriptions: &[Subscription]) -> HubResult<()> {
        let mut registry = lock(&self.subscriptions)?;
        for subscription in subscriptions {
            registry.store(subscription);
        }
        Ok(())
    }

    async fn remove_subscriptions(&self, subscriptions: &[Subscription]) -> HubResult<()> {
        let mut registry = lock(&self.subscriptions)?;
        for subscription in subscriptions {
            registry.remove(&subscription.id);
        }
        Ok(())
    }

    async fn find_subscriptions(
        &self,
        subscriber: Option<&str>,
        topic: Option<&str>,
    ) -> HubResult<Vec<Subscription>> {
        Ok(lock(&self.subscriptions)?
            .iter()
            .filter(|s| subscription_filter(s, subscriber, topic))
            .cloned()
            .collect())
    }
}

/// Handles `php://` and `memory://` DSNs, e.g. `php://localhost?size=1000`.
pub struct MemoryStorageFactory;

#[async_trait]
impl StorageFactory for MemoryStorageFactory {
    fn supports(&self, dsn: &Url) -> bool {
        matches!(dsn.scheme(), "php" | "memory")
    }

    async fn create(&self, dsn: &Url, _fatal: CancellationToken) -> HubResult<Arc<dyn Storage>> {
        Ok(Arc::new(MemoryStorage::new(history_size(dsn)?)))
    }
}
