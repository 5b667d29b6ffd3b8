use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::Response;

use crate::broker::Broker;
use crate::config::Settings;
use crate::security::Authenticator;
use crate::utils::error::{HttpError, HubError, HubResult};

/// Path of the publish and subscribe endpoint.
pub const HUB_PATH: &str = "/.well-known/mercure";

/// A request handler of the hub, selected by its `matches` predicate.
#[async_trait]
pub trait Controller: Send + Sync {
    fn matches(&self, request: &Request) -> bool;

    async fn handle(&self, request: Request, peer: SocketAddr) -> Result<Response, HttpError>;
}

/// State shared by the controllers of one hub.
///
/// Authenticators are built once here, with the publisher and subscriber
/// keys already resolved.
pub struct HubContext {
    pub broker: Broker,
    pub publisher_auth: Authenticator,
    pub subscriber_auth: Authenticator,
    pub allow_anonymous: bool,
    pub subscriptions: bool,
}

impl HubContext {
    pub fn from_settings(settings: &Settings, broker: Broker) -> HubResult<Arc<Self>> {
        let jwt = &settings.jwt;
        let publisher_key = jwt
            .publisher_key()
            .ok_or_else(|| HubError::Config("missing publisher JWT key".to_string()))?;
        let subscriber_key = jwt
            .subscriber_key()
            .ok_or_else(|| HubError::Config("missing subscriber JWT key".to_string()))?;

        Ok(Arc::new(Self {
            broker,
            publisher_auth: Authenticator::new(publisher_key, jwt.publisher_algorithm())?,
            subscriber_auth: Authenticator::new(subscriber_key, jwt.subscriber_algorithm())?,
            allow_anonymous: settings.hub.allow_anonymous,
            subscriptions: settings.hub.subscriptions,
        }))
    }
}
