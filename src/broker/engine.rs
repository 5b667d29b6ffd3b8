use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::broker::message::Message;
use crate::broker::subscription::Subscription;
use crate::persistence::Storage;
use crate::transport::{MessageSender, Transport};
use crate::utils::error::HubResult;

/// Routes updates between publishers, live subscribers and the history.
///
/// The broker owns one transport for live fan-out and one storage for replay
/// and the subscription registry. It is shared by every request handler.
#[derive(Clone)]
pub struct Broker {
    transport: Arc<dyn Transport>,
    storage: Arc<dyn Storage>,
}

impl Broker {
    pub fn new(transport: Arc<dyn Transport>, storage: Arc<dyn Storage>) -> Self {
        Self { transport, storage }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Publishes an update to live subscribers, then records it in the history.
    ///
    /// Live delivery comes first: a subscriber that reconnects with an older
    /// cursor before the update is stored will not see it again in replay,
    /// and one that reconnects after may receive it twice.
    pub async fn publish(&self, topic: &str, message: Message) -> HubResult<String> {
        let id = self.transport.publish(topic, &message).await?;

        if let Err(e) = self.storage.store_message(topic, &message).await {
            error!("Failed to store update {} on {}: {}", id, topic, e);
        }

        debug!(topic, id = %id, "Published update");
        Ok(id)
    }

    /// Registers a live listener for `selector`.
    pub async fn subscribe(&self, selector: &str, sender: MessageSender) -> HubResult<()> {
        self.transport.subscribe(selector, sender).await
    }

    /// Persists subscriptions and announces each one as a private update on
    /// a topic equal to its own id.
    pub async fn dispatch_subscriptions(&self, subscriptions: &[Subscription]) -> HubResult<()> {
        if subscriptions.is_empty() {
            return Ok(());
        }

        self.storage.store_subscriptions(subscriptions).await?;

        for subscription in subscriptions {
            let mut message =
                Message::with_generated_id(Some(serde_json::to_string(subscription)?));
            message.private = true;
            self.publish(&subscription.id, message).await?;
        }

        Ok(())
    }

    /// Updates stored after `last_event_id` on topics matching `selectors`.
    ///
    /// An unreadable history is treated as having no missed updates.
    pub async fn fetch_missed_messages(
        &self,
        last_event_id: &str,
        selectors: &[String],
    ) -> Vec<(String, Message)> {
        match self
            .storage
            .retrieve_messages_after_id(last_event_id, selectors)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Unable to read missed updates after {}: {}", last_event_id, e);
                Vec::new()
            }
        }
    }

    pub async fn last_event_id(&self) -> Option<String> {
        match self.storage.last_event_id().await {
            Ok(id) => id,
            Err(e) => {
                warn!("Unable to read the last event id: {}", e);
                None
            }
        }
    }

    pub async fn find_subscriptions(
        &self,
        subscriber: Option<&str>,
        topic: Option<&str>,
    ) -> HubResult<Vec<Subscription>> {
        self.storage.find_subscriptions(subscriber, topic).await
    }

    /// Cleans up after a subscriber's connection closed.
    ///
    /// Its active subscriptions are removed from the registry, then stored
    /// again flagged inactive and announced, so the subscriptions API and
    /// listeners of the subscription topics both see the unsubscription.
    /// Returns the number of subscriptions closed.
    pub async fn handle_connection_closed(&self, subscriber: &str) -> HubResult<usize> {
        let active: Vec<Subscription> = self
            .storage
            .find_subscriptions(Some(subscriber), None)
            .await?
            .into_iter()
            .filter(|s| s.active)
            .collect();

        if active.is_empty() {
            return Ok(0);
        }

        self.storage.remove_subscriptions(&active).await?;

        let inactive: Vec<Subscription> = active.iter().map(Subscription::deactivated).collect();
        self.dispatch_subscriptions(&inactive).await?;

        debug!(subscriber, count = inactive.len(), "Closed subscriptions");
        Ok(inactive.len())
    }
}
