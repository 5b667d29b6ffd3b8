//! Subscriptions API: `GET /.well-known/mercure/subscriptions[/{topic}[/{subscriber}]]`.
//!
//! Only enabled with the `subscriptions` option. The caller's token must
//! allow subscribing to the requested path, and only subscriptions whose own
//! id the token allows are listed.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use percent_encoding::percent_decode_str;
use serde_json::{Value, json};
use tracing::error;

use crate::broker::subscription::{JSON_LD_CONTEXT, SUBSCRIPTIONS_PATH, Subscription};
use crate::persistence::EARLIEST;
use crate::security::Claim;
use crate::security::matcher::can_subscribe;
use crate::server::controller::{Controller, HubContext};
use crate::utils::error::{HttpError, HubError};

pub struct SubscriptionsController {
    context: Arc<HubContext>,
}

impl SubscriptionsController {
    pub fn new(context: Arc<HubContext>) -> Self {
        Self { context }
    }
}

/// Decoded `{topic}` and `{subscriber}` segments following the API prefix,
/// `None` when the path has more segments than that.
pub fn path_filters(path: &str) -> Option<(Option<String>, Option<String>)> {
    let rest = path.strip_prefix(SUBSCRIPTIONS_PATH)?;
    let segments: Vec<String> = rest
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
        .collect();

    let mut segments = segments.into_iter();
    let topic = segments.next();
    let subscriber = segments.next();
    if segments.next().is_some() {
        return None;
    }
    Some((topic, subscriber))
}

fn json_ld(document: Value) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/ld+json")],
        document.to_string(),
    )
        .into_response()
}

fn visible(subscription: &Subscription, claim: Option<&Claim>) -> bool {
    can_subscribe(&subscription.id, claim, false)
}

#[async_trait]
impl Controller for SubscriptionsController {
    fn matches(&self, request: &Request) -> bool {
        if !self.context.subscriptions {
            return false;
        }
        let path = request.uri().path();
        path == SUBSCRIPTIONS_PATH
            || path
                .strip_prefix(SUBSCRIPTIONS_PATH)
                .is_some_and(|rest| rest.starts_with('/'))
    }

    async fn handle(&self, request: Request, _peer: SocketAddr) -> Result<Response, HttpError> {
        match *request.method() {
            Method::OPTIONS => return Ok(StatusCode::OK.into_response()),
            Method::GET | Method::HEAD => {}
            _ => return Err(HttpError::method_not_allowed()),
        }

        let token = self
            .context
            .subscriber_auth
            .authenticate(request.headers())
            .map_err(|e| HttpError::forbidden(e.to_string()))?
            .ok_or_else(|| {
                HttpError::forbidden("You must be authenticated to access the Subscription API.")
            })?;
        let claim = token.mercure;

        let path = request.uri().path();
        if !can_subscribe(path, claim.as_ref(), false) {
            return Err(HttpError::forbidden(
                "You are not authorized to display these subscriptions.",
            ));
        }

        let (topic, subscriber) = path_filters(path).ok_or_else(HttpError::not_found)?;
        let broker = &self.context.broker;
        let lookup_failed = |e: HubError| {
            error!("Unable to read subscriptions: {}", e);
            HttpError::internal("Unable to read subscriptions.")
        };

        if let (Some(topic), Some(subscriber)) = (&topic, &subscriber) {
            let found = broker
                .find_subscriptions(Some(subscriber), None)
                .await
                .map_err(lookup_failed)?
                .into_iter()
                .find(|s| &s.topic == topic && visible(s, claim.as_ref()))
                .ok_or_else(HttpError::not_found)?;
            return Ok(json_ld(json!(found)));
        }

        let subscriptions: Vec<Subscription> = broker
            .find_subscriptions(subscriber.as_deref(), topic.as_deref())
            .await
            .map_err(lookup_failed)?
            .into_iter()
            .filter(|s| visible(s, claim.as_ref()))
            .collect();
        let last_event_id = broker
            .last_event_id()
            .await
            .unwrap_or_else(|| EARLIEST.to_string());

        Ok(json_ld(json!({
            "@context": JSON_LD_CONTEXT,
            "id": path,
            "type": "Subscriptions",
            "lastEventID": last_event_id,
            "subscriptions": subscriptions,
        })))
    }
}
