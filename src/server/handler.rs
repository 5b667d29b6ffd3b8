use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::Router;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::{Request, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use tower_http::trace::TraceLayer;

use crate::security::CorsPolicy;
use crate::server::controller::{Controller, HubContext};
use crate::server::health::HealthController;
use crate::server::publish::PublishController;
use crate::server::subscribe::SubscribeController;
use crate::server::subscriptions::SubscriptionsController;
use crate::utils::error::HttpError;

/// Peer reported when a request carries no connection info.
const UNKNOWN_PEER: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);

/// Dispatches each request to the first controller that matches it, in
/// registration order, and adds CORS headers to every response.
pub struct RequestHandler {
    controllers: Vec<Box<dyn Controller>>,
    cors: CorsPolicy,
}

impl RequestHandler {
    pub fn new(context: Arc<HubContext>, cors: CorsPolicy) -> Self {
        Self {
            controllers: vec![
                Box::new(HealthController),
                Box::new(SubscribeController::new(context.clone())),
                Box::new(PublishController::new(context.clone())),
                Box::new(SubscriptionsController::new(context)),
            ],
            cors,
        }
    }

    pub async fn handle(&self, request: Request, peer: SocketAddr) -> Response {
        let method = request.method().clone();
        let origin = request
            .headers()
            .get(header::ORIGIN)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let mut response = match self.controllers.iter().find(|c| c.matches(&request)) {
            Some(controller) => controller
                .handle(request, peer)
                .await
                .unwrap_or_else(IntoResponse::into_response),
            None => HttpError::not_found().into_response(),
        };

        self.cors
            .decorate(&method, origin.as_deref(), response.headers_mut());
        response
    }
}

/// Builds the hub's router: every path goes through the [`RequestHandler`].
pub fn router(handler: Arc<RequestHandler>) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(handler)
        .layer(TraceLayer::new_for_http())
}

async fn dispatch(State(handler): State<Arc<RequestHandler>>, request: Request) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .unwrap_or(UNKNOWN_PEER);
    handler.handle(request, peer).await
}
