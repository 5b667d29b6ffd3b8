//! Subscription to updates: `GET /.well-known/mercure?topic=...`.
//!
//! The response is an event stream opened immediately. A spawned
//! [`SubscriberSession`] then feeds it in two phases:
//!
//! 1. replay: when a `Last-Event-ID` was given, every stored update after it
//!    that the subscriber may receive;
//! 2. live: only once replay is written, listeners are registered for each
//!    selector the subscriber is authorized for.
//!
//! No live update can therefore overtake the backlog.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

use crate::broker::message::Message;
use crate::broker::subscription::Subscription;
use crate::broker::Broker;
use crate::client::Client;
use crate::security::Claim;
use crate::security::matcher::{can_receive, can_subscribe};
use crate::server::controller::{Controller, HUB_PATH, HubContext};
use crate::utils::error::HttpError;

pub const LAST_EVENT_ID: &str = "Last-Event-ID";

pub struct SubscribeController {
    context: Arc<HubContext>,
}

impl SubscribeController {
    pub fn new(context: Arc<HubContext>) -> Self {
        Self { context }
    }
}

/// Values of the repeated `name` query parameter, URL-decoded.
pub fn query_values(query: Option<&str>, name: &str) -> Vec<String> {
    url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
        .filter(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .collect()
}

/// Reads the replay cursor from the header, then from the query string
/// (case-insensitive key). Empty values count as absent.
pub fn last_event_id(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    let from_header = headers
        .get(LAST_EVENT_ID)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    from_header.or_else(|| {
        url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
            .find(|(key, value)| key.eq_ignore_ascii_case(LAST_EVENT_ID) && !value.is_empty())
            .map(|(_, value)| value.into_owned())
    })
}

#[async_trait]
impl Controller for SubscribeController {
    fn matches(&self, request: &Request) -> bool {
        request.uri().path() == HUB_PATH
            && matches!(
                *request.method(),
                Method::GET | Method::HEAD | Method::OPTIONS
            )
    }

    async fn handle(&self, request: Request, peer: SocketAddr) -> Result<Response, HttpError> {
        if request.method() == Method::OPTIONS {
            return Ok(StatusCode::OK.into_response());
        }
        if request.method() != Method::GET {
            return Err(HttpError::method_not_allowed());
        }

        let token = self
            .context
            .subscriber_auth
            .authenticate(request.headers())
            .map_err(|e| HttpError::forbidden(e.to_string()))?;
        if token.is_none() && !self.context.allow_anonymous {
            return Err(HttpError::unauthorized(
                "Anonymous subscriptions are not allowed on this hub.",
            ));
        }
        let claim = token.and_then(|t| t.mercure);

        let query = request.uri().query();
        let topics = query_values(query, "topic");
        if topics.is_empty() {
            return Err(HttpError::bad_request("Missing \"topic\" parameter."));
        }
        let last_event_id = last_event_id(request.headers(), query);

        let client = Client::from_addr(peer);
        if self.context.subscriptions {
            let payload = claim.as_ref().and_then(|c| c.payload.clone());
            let subscriptions: Vec<Subscription> = topics
                .iter()
                .map(|topic| Subscription::new(topic, &client.id, payload.clone()))
                .collect();
            if let Err(e) = self.context.broker.dispatch_subscriptions(&subscriptions).await {
                warn!("Unable to dispatch subscriptions of {}: {}", client.id, e);
            }
        }

        let (sink, stream) = mpsc::unbounded_channel::<Bytes>();
        let session = SubscriberSession {
            broker: self.context.broker.clone(),
            topics,
            claim,
            allow_anonymous: self.context.allow_anonymous,
            sink,
            last_sent: None,
        };
        tokio::spawn(session.run(last_event_id));

        debug!(subscriber = %client.id, "Opened event stream");
        let body = Body::from_stream(UnboundedReceiverStream::new(stream).map(Ok::<_, Infallible>));
        Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            body,
        )
            .into_response())
    }
}

/// Writes the updates of one event stream.
pub struct SubscriberSession {
    broker: Broker,
    topics: Vec<String>,
    claim: Option<Claim>,
    allow_anonymous: bool,
    sink: UnboundedSender<Bytes>,
    last_sent: Option<String>,
}

impl SubscriberSession {
    pub async fn run(mut self, last_event_id: Option<String>) {
        if let Some(cursor) = last_event_id {
            let missed = self.broker.fetch_missed_messages(&cursor, &self.topics).await;
            for (topic, message) in missed {
                if !self.deliver(&topic, &message) {
                    return;
                }
            }
        }

        let (listener, mut updates) = mpsc::unbounded_channel();
        for topic in &self.topics {
            if !can_subscribe(topic, self.claim.as_ref(), self.allow_anonymous) {
                debug!(topic = %topic, "Skipping unauthorized selector");
                continue;
            }
            if let Err(e) = self.broker.subscribe(topic, listener.clone()).await {
                warn!("Unable to subscribe to {}: {}", topic, e);
            }
        }
        drop(listener);

        let closed = self.sink.clone();
        loop {
            tokio::select! {
                _ = closed.closed() => break,
                update = updates.recv() => match update {
                    Some((topic, message)) => {
                        if !self.deliver(&topic, &message) {
                            break;
                        }
                    }
                    // Nothing was subscribed: keep the stream open until the client leaves.
                    None => {
                        closed.closed().await;
                        break;
                    }
                }
            }
        }
    }

    /// Writes the update if the subscriber may receive it. Returns false once
    /// the client is gone.
    fn deliver(&mut self, topic: &str, message: &Message) -> bool {
        if !can_receive(
            topic,
            message,
            &self.topics,
            self.claim.as_ref(),
            self.allow_anonymous,
        ) {
            return true;
        }
        if self.last_sent.as_deref() == Some(message.id.as_str()) {
            return true;
        }
        if self.sink.send(Bytes::from(message.to_sse())).is_err() {
            return false;
        }
        self.last_sent = Some(message.id.clone());
        true
    }
}
