//! CORS headers for subscriber and publisher origins.

use axum::http::{HeaderMap, HeaderValue, Method, header};

use crate::config::parse_origins;

const ALLOW_METHODS: &str = "POST, GET, OPTIONS";
const ALLOW_HEADERS: &str = "Cache-control, Authorization, Last-Event-ID";
const MAX_AGE: &str = "3600";

/// CORS allow-lists for subscriber and publisher traffic.
///
/// Publishing (`POST`) is checked against the publisher list, every other
/// method against the subscriber list. `*` in a list allows any origin.
#[derive(Debug, Clone, Default)]
pub struct CorsPolicy {
    subscriber_origins: Vec<String>,
    publisher_origins: Vec<String>,
}

impl CorsPolicy {
    pub fn new(cors_allowed_origins: &str, publish_allowed_origins: &str) -> Self {
        Self {
            subscriber_origins: parse_origins(cors_allowed_origins),
            publisher_origins: parse_origins(publish_allowed_origins),
        }
    }

    pub fn is_allowed(&self, method: &Method, origin: &str) -> bool {
        let origins = if method == Method::POST {
            &self.publisher_origins
        } else {
            &self.subscriber_origins
        };

        origins.iter().any(|allowed| allowed == "*" || allowed == origin)
    }

    /// Adds the CORS headers to a response; no `Origin` means no headers.
    pub fn decorate(&self, method: &Method, origin: Option<&str>, headers: &mut HeaderMap) {
        let Some(origin) = origin.filter(|origin| self.is_allowed(method, origin)) else {
            return;
        };
        let Ok(origin) = HeaderValue::from_str(origin) else {
            return;
        };

        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(MAX_AGE));
    }
}
