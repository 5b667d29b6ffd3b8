use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::broker::message::Message;
use crate::security::matcher::Selector;
use crate::transport::{MessageSender, Transport, TransportFactory};
use crate::utils::error::{HubError, HubResult};

#[derive(Debug)]
struct Listener {
    selector: Selector,
    sender: MessageSender,
}

/// In-process event bus: each publish walks the listener list once.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    listeners: Mutex<Vec<Listener>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of listeners whose receiver is still alive.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .map(|listeners| listeners.iter().filter(|l| !l.sender.is_closed()).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, topic: &str, message: &Message) -> HubResult<String> {
        let mut listeners = self
            .listeners
            .lock()
            .map_err(|_| HubError::Backend("transport listeners poisoned".to_string()))?;

        listeners.retain(|listener| !listener.sender.is_closed());
        for listener in listeners.iter() {
            if listener.selector.matches(topic) {
                // A receiver dropped since the retain is pruned on the next publish.
                let _ = listener.sender.send((topic.to_string(), message.clone()));
            }
        }

        Ok(message.id.clone())
    }

    async fn subscribe(&self, selector: &str, sender: MessageSender) -> HubResult<()> {
        let mut listeners = self
            .listeners
            .lock()
            .map_err(|_| HubError::Backend("transport listeners poisoned".to_string()))?;
        listeners.push(Listener {
            selector: Selector::new(selector),
            sender,
        });
        Ok(())
    }
}

/// Handles `php://` and `memory://` DSNs.
pub struct MemoryTransportFactory;

#[async_trait]
impl TransportFactory for MemoryTransportFactory {
    fn supports(&self, dsn: &Url) -> bool {
        matches!(dsn.scheme(), "php" | "memory")
    }

    async fn create(&self, _dsn: &Url, _fatal: CancellationToken) -> HubResult<Arc<dyn Transport>> {
        Ok(Arc::new(MemoryTransport::new()))
    }
}
