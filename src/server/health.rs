use std::net::SocketAddr;

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::server::controller::{Controller, HUB_PATH};
use crate::utils::error::HttpError;

pub struct HealthController;

impl HealthController {
    pub fn path() -> String {
        format!("{HUB_PATH}/health")
    }
}

#[async_trait]
impl Controller for HealthController {
    fn matches(&self, request: &Request) -> bool {
        request.uri().path() == Self::path()
    }

    async fn handle(&self, request: Request, _peer: SocketAddr) -> Result<Response, HttpError> {
        if request.method() != Method::GET && request.method() != Method::HEAD {
            return Err(HttpError::method_not_allowed());
        }

        Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
        )
            .into_response())
    }
}
