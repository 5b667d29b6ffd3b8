//! The `persistence` module keeps the hub's history and subscription registry.
//!
//! History lets a reconnecting subscriber replay the updates it missed,
//! starting after the last id it saw (or from the start with [`EARLIEST`]).
//! The registry backs the subscriptions API and the cleanup performed when a
//! subscriber disconnects.
//!
//! Backends are picked from the storage DSN through an ordered chain of
//! [`StorageFactory`] values:
//!
//! - `redis://`, `rediss://`: [`redis_store::RedisStorage`]
//! - `php://`, `memory://`: [`memory::MemoryStorage`], bounded by the `size` query parameter
//! - `null://`: [`null::NullStorage`]

pub mod memory;
pub mod null;
pub mod redis_store;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use crate::broker::message::Message;
use crate::broker::subscription::Subscription;
use crate::utils::error::{HubError, HubResult};

/// Cursor requesting the whole retained history.
pub const EARLIEST: &str = "earliest";

/// How many closed (inactive) subscriptions a registry keeps, oldest dropped first.
pub const CLOSED_SUBSCRIPTIONS_LIMIT: usize = 1000;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Id of the most recently stored message, if any.
    async fn last_event_id(&self) -> HubResult<Option<String>>;

    /// Messages stored strictly after `id` (or all of them for [`EARLIEST`])
    /// whose topic matches `selectors`, in publish order. An unknown id yields
    /// nothing.
    async fn retrieve_messages_after_id(
        &self,
        id: &str,
        selectors: &[String],
    ) -> HubResult<Vec<(String, Message)>>;

    async fn store_message(&self, topic: &str, message: &Message) -> HubResult<()>;

    /// Inserts or replaces subscriptions by id. Inactive subscriptions are
    /// only retained up to [`CLOSED_SUBSCRIPTIONS_LIMIT`].
    async fn store_subscriptions(&self, subscriptions: &[Subscription]) -> HubResult<()>;

    async fn remove_subscriptions(&self, subscriptions: &[Subscription]) -> HubResult<()>;

    /// Subscriptions of `subscriber` (exact match) whose topic matches `topic`
    /// used as a selector. `None` disables a filter.
    async fn find_subscriptions(
        &self,
        subscriber: Option<&str>,
        topic: Option<&str>,
    ) -> HubResult<Vec<Subscription>>;
}

#[async_trait]
pub trait StorageFactory: Send + Sync {
    fn supports(&self, dsn: &Url) -> bool;

    async fn create(&self, dsn: &Url, fatal: CancellationToken) -> HubResult<Arc<dyn Storage>>;
}

pub fn factories() -> Vec<Box<dyn StorageFactory>> {
    vec![
        Box::new(redis_store::RedisStorageFactory),
        Box::new(memory::MemoryStorageFactory),
        Box::new(null::NullStorageFactory),
    ]
}

pub async fn create_storage(dsn: &str, fatal: CancellationToken) -> HubResult<Arc<dyn Storage>> {
    let url = Url::parse(dsn).map_err(|e| HubError::InvalidDsn(format!("{dsn}: {e}")))?;
    for factory in factories() {
        if factory.supports(&url) {
            info!("Using {} storage", url.scheme());
            return factory.create(&url, fatal).await;
        }
    }
    Err(HubError::InvalidDsn(format!("no storage supports \"{dsn}\"")))
}

/// Reads the history capacity from the `size` query parameter, `0` when absent.
pub fn history_size(dsn: &Url) -> HubResult<usize> {
    match dsn.query_pairs().find(|(key, _)| key == "size") {
        Some((_, value)) => value
            .parse()
            .map_err(|_| HubError::InvalidDsn(format!("invalid size in \"{dsn}\""))),
        None => Ok(0),
    }
}

/// Applies the subscriber and topic filters of [`Storage::find_subscriptions`].
pub fn subscription_filter(
    subscription: &Subscription,
    subscriber: Option<&str>,
    topic: Option<&str>,
) -> bool {
    subscriber.is_none_or(|subscriber| subscription.subscriber == subscriber)
        && topic.is_none_or(|topic| {
            crate::security::matcher::matches_selectors(&subscription.topic, &[topic])
        })
}
