//! The `transport` module fans published updates out to live subscribers.
//!
//! A [`Transport`] delivers each published update to every registered
//! listener whose selector matches the update's topic. Listeners are channel
//! senders: the subscriber's stream task owns the receiving end, so a slow
//! consumer never blocks a publisher. Dropping the receiver unregisters the
//! listener.
//!
//! Backends are picked from the configured DSN by trying each
//! [`TransportFactory`] in order; the first that supports the DSN wins.

pub mod memory;
pub mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use crate::broker::message::Message;
use crate::utils::error::{HubError, HubResult};

/// Receives `(topic, message)` pairs for one subscribed selector.
pub type MessageSender = UnboundedSender<(String, Message)>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Hands the message to every live listener matching `topic` and returns its id.
    async fn publish(&self, topic: &str, message: &Message) -> HubResult<String>;

    /// Registers `sender` for every update whose topic matches `selector`.
    async fn subscribe(&self, selector: &str, sender: MessageSender) -> HubResult<()>;
}

#[async_trait]
pub trait TransportFactory: Send + Sync {
    fn supports(&self, dsn: &Url) -> bool;

    /// Builds the backend. `fatal` is cancelled when the backend loses its connection.
    async fn create(&self, dsn: &Url, fatal: CancellationToken) -> HubResult<Arc<dyn Transport>>;
}

pub fn factories() -> Vec<Box<dyn TransportFactory>> {
    vec![
        Box::new(redis::RedisTransportFactory),
        Box::new(memory::MemoryTransportFactory),
    ]
}

/// Creates the transport for `dsn`; an unsupported scheme is a configuration error.
pub async fn create_transport(dsn: &str, fatal: CancellationToken) -> HubResult<Arc<dyn Transport>> {
    let url = Url::parse(dsn).map_err(|e| HubError::InvalidDsn(format!("{dsn}: {e}")))?;
    for factory in factories() {
        if factory.supports(&url) {
            info!("Using {} transport", url.scheme());
            return factory.create(&url, fatal).await;
        }
    }
    Err(HubError::InvalidDsn(format!("no transport supports \"{dsn}\"")))
}
