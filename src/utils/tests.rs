use axum::http::StatusCode;
use axum::response::IntoResponse;
use url::Url;

use super::error::{HttpError, HubError};
use super::logging::parse_level;
use super::redis::{is_redis_dsn, open_client};

#[test]
fn test_http_error_renders_plain_text() {
    let response = HttpError::forbidden("Invalid auth token.").into_response();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().starts_with("text/plain"));
}

#[test]
fn test_http_error_not_found_message() {
    let err = HttpError::not_found();
    assert_eq!(err.status, StatusCode::NOT_FOUND);
    assert_eq!(err.message, "Not found.");
    assert_eq!(err.to_string(), "404 Not found.");
}

#[test]
fn test_parse_level() {
    assert_eq!(parse_level("WARNING"), tracing::Level::WARN);
    assert_eq!(parse_level("debug"), tracing::Level::DEBUG);
    assert_eq!(parse_level("nonsense"), tracing::Level::INFO);
}

#[test]
fn test_redis_dsn_detection() {
    assert!(is_redis_dsn(&Url::parse("redis://localhost:6379").unwrap()));
    assert!(is_redis_dsn(&Url::parse("rediss://localhost").unwrap()));
    assert!(!is_redis_dsn(&Url::parse("php://localhost?size=10").unwrap()));
}

#[test]
fn test_open_client_rejects_other_schemes() {
    let err = open_client(&Url::parse("memory://localhost").unwrap()).unwrap_err();
    assert!(matches!(err, HubError::InvalidDsn(_)));
}
