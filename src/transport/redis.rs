//! Redis pub/sub transport.
//!
//! Two connections are used: a multiplexed one for `PUBLISH`, and a dedicated
//! pub/sub connection for `SUBSCRIBE`/`PSUBSCRIBE`. Literal selectors map to
//! channels. `*` and URI templates map to glob patterns where every template
//! expression becomes `*`; since a glob is coarser than the template, every
//! delivered update is matched again against the listener's selector.
//!
//! Losing either connection cancels the hub's fatal token.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use url::Url;

use crate::broker::message::Message;
use crate::security::matcher::{Selector, WILDCARD};
use crate::transport::{MessageSender, Transport, TransportFactory};
use crate::utils::error::{HubError, HubResult};
use crate::utils::redis::{connect, is_connection_error, is_redis_dsn, open_client};

/// What a selector subscribes to on the Redis side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    Exact(String),
    Pattern(String),
}

impl Channel {
    pub fn for_selector(selector: &str) -> Self {
        if selector == WILDCARD {
            Channel::Pattern("*".to_string())
        } else if selector.contains('{') {
            Channel::Pattern(template_to_glob(selector))
        } else {
            Channel::Exact(selector.to_string())
        }
    }
}

/// Replaces every `{...}` expression with `*`, escaping glob characters elsewhere.
pub fn template_to_glob(template: &str) -> String {
    let mut glob = String::with_capacity(template.len());
    let mut in_expression = false;
    for c in template.chars() {
        match c {
            '{' if !in_expression => {
                in_expression = true;
                glob.push('*');
            }
            '}' if in_expression => in_expression = false,
            _ if in_expression => {}
            '*' | '?' | '[' | ']' | '\\' => {
                glob.push('\\');
                glob.push(c);
            }
            _ => glob.push(c),
        }
    }
    glob
}

struct Listener {
    channel: Channel,
    selector: Selector,
    sender: MessageSender,
}

struct SubscribeCommand {
    channel: Channel,
    done: oneshot::Sender<redis::RedisResult<()>>,
}

pub struct RedisTransport {
    publisher: MultiplexedConnection,
    commands: mpsc::UnboundedSender<SubscribeCommand>,
    listeners: Arc<Mutex<Vec<Listener>>>,
    fatal: CancellationToken,
}

impl RedisTransport {
    pub async fn connect(dsn: &Url, fatal: CancellationToken) -> HubResult<Self> {
        let client = open_client(dsn)?;
        let publisher = connect(&client).await?;
        let (mut sink, mut stream) = client.get_async_pubsub().await?.split();

        let (commands, mut pending) = mpsc::unbounded_channel::<SubscribeCommand>();
        tokio::spawn(async move {
            let mut subscribed = HashSet::new();
            while let Some(command) = pending.recv().await {
                let result = if subscribed.contains(&command.channel) {
                    Ok(())
                } else {
                    match &command.channel {
                        Channel::Exact(name) => sink.subscribe(name).await,
                        Channel::Pattern(pattern) => sink.psubscribe(pattern).await,
                    }
                };
                if result.is_ok() {
                    subscribed.insert(command.channel.clone());
                }
                let _ = command.done.send(result);
            }
        });

        let listeners = Arc::new(Mutex::new(Vec::new()));
        let routed = Arc::clone(&listeners);
        let token = fatal.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    next = stream.next() => match next {
                        Some(msg) => route(&routed, msg),
                        None => {
                            error!("Redis subscriber connection closed");
                            token.cancel();
                            return;
                        }
                    }
                }
            }
        });

        Ok(Self {
            publisher,
            commands,
            listeners,
            fatal,
        })
    }
}

fn route(listeners: &Mutex<Vec<Listener>>, msg: redis::Msg) {
    let topic = msg.get_channel_name().to_string();
    let channel = if msg.from_pattern() {
        match msg.get_pattern::<String>() {
            Ok(pattern) => Channel::Pattern(pattern),
            Err(_) => return,
        }
    } else {
        Channel::Exact(topic.clone())
    };

    let message = match msg.get_payload::<String>().map(|p| Message::from_json(&p)) {
        Ok(Ok(message)) => message,
        _ => {
            warn!(topic = %topic, "Dropping undecodable update");
            return;
        }
    };

    let Ok(mut listeners) = listeners.lock() else {
        return;
    };
    listeners.retain(|listener| !listener.sender.is_closed());
    for listener in listeners.iter() {
        // Each delivery names the channel or pattern it came from, so a
        // listener only sees the copy for its own subscription.
        if listener.channel == channel && listener.selector.matches(&topic) {
            let _ = listener.sender.send((topic.clone(), message.clone()));
        }
    }
}

#[async_trait]
impl Transport for RedisTransport {
    async fn publish(&self, topic: &str, message: &Message) -> HubResult<String> {
        let payload = message.to_json()?;
        let mut conn = self.publisher.clone();
        let result: redis::RedisResult<i64> = conn.publish(topic, payload).await;
        match result {
            Ok(receivers) => {
                debug!(topic, receivers, "Published update");
                Ok(message.id.clone())
            }
            Err(err) => {
                if is_connection_error(&err) {
                    error!("Redis publisher connection lost: {}", err);
                    self.fatal.cancel();
                }
                Err(err.into())
            }
        }
    }

    async fn subscribe(&self, selector: &str, sender: MessageSender) -> HubResult<()> {
        let channel = Channel::for_selector(selector);
        self.listeners
            .lock()
            .map_err(|_| HubError::Backend("transport listeners poisoned".to_string()))?
            .push(Listener {
                channel: channel.clone(),
                selector: Selector::new(selector),
                sender,
            });

        let (done, confirmed) = oneshot::channel();
        self.commands
            .send(SubscribeCommand { channel, done })
            .map_err(|_| HubError::Backend("redis subscriber is gone".to_string()))?;
        match confirmed.await {
            Ok(result) => result.map_err(|err| {
                if is_connection_error(&err) {
                    self.fatal.cancel();
                }
                err.into()
            }),
            Err(_) => Err(HubError::Backend("redis subscriber is gone".to_string())),
        }
    }
}

/// Handles `redis://` and `rediss://` DSNs.
pub struct RedisTransportFactory;

#[async_trait]
impl TransportFactory for RedisTransportFactory {
    fn supports(&self, dsn: &Url) -> bool {
        is_redis_dsn(dsn)
    }

    async fn create(&self, dsn: &Url, fatal: CancellationToken) -> HubResult<Arc<dyn Transport>> {
        Ok(Arc::new(RedisTransport::connect(dsn, fatal).await?))
    }
}
