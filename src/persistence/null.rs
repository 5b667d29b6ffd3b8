use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::broker::message::Message;
use crate::broker::subscription::Subscription;
use crate::persistence::{Storage, StorageFactory};
use crate::utils::error::HubResult;

/// Storage that keeps nothing: no replay and an always empty registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStorage;

#[async_trait]
impl Storage for NullStorage {
    async fn last_event_id(&self) -> HubResult<Option<String>> {
        Ok(None)
    }

    async fn retrieve_messages_after_id(
        &self,
        _id: &str,
        _selectors: &[String],
    ) -> HubResult<Vec<(String, Message)>> {
        Ok(Vec::new())
    }

    async fn store_message(&self, _topic: &str, _message: &Message) -> HubResult<()> {
        Ok(())
    }

    async fn store_subscriptions(&self, _subscriptions: &[Subscription]) -> HubResult<()> {
        Ok(())
    }

    async fn remove_subscriptions(&self, _subscriptions: &[Subscription]) -> HubResult<()> {
        Ok(())
    }

    async fn find_subscriptions(
        &self,
        _subscriber: Option<&str>,
        _topic: Option<&str>,
    ) -> HubResult<Vec<Subscription>> {
        Ok(Vec::new())
    }
}

pub struct NullStorageFactory;

#[async_trait]
impl StorageFactory for NullStorageFactory {
    fn supports(&self, dsn: &Url) -> bool {
        dsn.scheme() == "null"
    }

    async fn create(&self, _dsn: &Url, _fatal: CancellationToken) -> HubResult<Arc<dyn Storage>> {
        Ok(Arc::new(NullStorage))
    }
}
