use axum::http::{HeaderMap, HeaderValue, Method, header};
use serde_json::json;

use super::authenticator::{AUTHORIZATION_COOKIE, extract_token};
use super::claim::{AuthToken, Claim};
use super::cors::CorsPolicy;
use super::jwt::sign;
use super::matcher::{Selector, can_publish, can_receive, can_subscribe, matches_selectors};
use super::uri_template::UriTemplate;
use super::{AuthError, Authenticator};
use crate::broker::message::Message;

const KEY: &str = "!ChangeMe!";

fn claim(value: serde_json::Value) -> Claim {
    Claim::from_value(&value).expect("claim object")
}

fn private_message() -> Message {
    let mut message = Message::new("id", Some("bar".to_string()));
    message.private = true;
    message
}

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    headers
}

#[test]
fn test_uri_template_simple_expression() {
    let template = UriTemplate::parse("/books/{id}").unwrap();
    assert!(template.matches("/books/42"));
    assert!(!template.matches("/films/42"));
    assert!(!template.matches("/books/42/chapters"));
    assert_eq!(template.as_str(), "/books/{id}");
}

#[test]
fn test_uri_template_operators() {
    let path = UriTemplate::parse("/users{/id,section}").unwrap();
    assert!(path.matches("/users/1"));
    assert!(path.matches("/users/1/profile"));
    assert!(!path.matches("/users/1/profile/extra"));

    let reserved = UriTemplate::parse("/files/{+path}").unwrap();
    assert!(reserved.matches("/files/a/b/c.txt"));

    let query = UriTemplate::parse("/search{?q,lang}").unwrap();
    assert!(query.matches("/search?q=rust"));
    assert!(query.matches("/search?q=rust&lang=en"));
    assert!(query.matches("/search"));

    let label = UriTemplate::parse("/archive{.format}").unwrap();
    assert!(label.matches("/archive.json"));
}

#[test]
fn test_uri_template_rejects_malformed_templates() {
    assert!(UriTemplate::parse("/books/{id").is_none());
    assert!(UriTemplate::parse("/books/id}").is_none());
    assert!(UriTemplate::parse("/books/{!id}").is_none());
    assert!(!matches_selectors("/books/1", &["/books/{id"]));
}

#[test]
fn test_matches_selectors() {
    assert!(matches_selectors("/foo", &["/foo"]));
    assert!(matches_selectors("/foo", &["*"]));
    assert!(matches_selectors("/foo/{bar}", &["*"]));
    assert!(matches_selectors("/books/42", &["/books/{id}"]));
    assert!(!matches_selectors("/films/42", &["/books/{id}"]));
    assert!(!matches_selectors("/foo", &[] as &[&str]));
    // a literal selector is never interpreted as a template
    assert!(!matches_selectors("/books/42", &["/books/42/"]));
}

#[test]
fn test_can_publish_requires_publish_list() {
    let claim = claim(json!({"subscribe": ["*"]}));
    assert!(!can_publish("/foo", &claim, false));
    assert!(!can_publish("/foo", &claim, true));
}

#[test]
fn test_can_publish_exclude_wins() {
    let claim = claim(json!({"publish": ["/foo/{id}"], "publish_exclude": ["/foo/bar"]}));
    assert!(!can_publish("/foo/bar", &claim, true));
    assert!(!can_publish("/foo/bar", &claim, false));
    assert!(can_publish("/foo/baz", &claim, true));
}

#[test]
fn test_can_publish_public_only_checks_exclusions() {
    let claim = claim(json!({"publish": []}));
    assert!(can_publish("/anything", &claim, false));
    assert!(!can_publish("/anything", &claim, true));
}

#[test]
fn test_can_subscribe() {
    let claim = claim(json!({"subscribe": ["*"], "subscribe_exclude": ["/bar"]}));
    assert!(can_subscribe("/foo", Some(&claim), false));
    assert!(!can_subscribe("/bar", Some(&claim), false));
    assert!(can_subscribe("/bar", None, true));
    assert!(!can_subscribe("/foo", None, false));
}

#[test]
fn test_can_receive_anonymous() {
    let subscribed = ["/alice", "/bob", "/channels/{channel}"];
    let public = Message::new("id", Some("bar".to_string()));

    assert!(can_receive("/alice", &public, &subscribed, None, true));
    assert!(can_receive("/channels/foo", &public, &subscribed, None, true));
    assert!(!can_receive("/unknown", &public, &subscribed, None, true));
    assert!(!can_receive("/alice", &private_message(), &subscribed, None, true));
    assert!(!can_receive("/alice", &public, &subscribed, None, false));
}

#[test]
fn test_can_receive_private_with_token() {
    let subscribed = ["/alice", "/bob", "/channels/{channel}", "/admins/{id}"];
    let claim = claim(json!({"subscribe": ["/alice", "/channels/{channel}"]}));
    let private = private_message();

    assert!(can_receive("/alice", &private, &subscribed, Some(&claim), false));
    assert!(!can_receive("/bob", &private, &subscribed, Some(&claim), false));
    assert!(can_receive("/channels/foo", &private, &subscribed, Some(&claim), false));
    assert!(!can_receive("/admins/1", &private, &subscribed, Some(&claim), false));
    assert!(!can_receive("/unknown", &private, &subscribed, Some(&claim), false));

    let public = Message::new("id", None);
    assert!(can_receive("/bob", &public, &subscribed, Some(&claim), false));
}

#[test]
fn test_can_receive_honors_subscribe_exclude() {
    let subscribed = ["*"];
    let claim = claim(json!({"subscribe": ["*"], "subscribe_exclude": ["/bar"]}));
    let public = Message::new("id", None);

    assert!(!can_receive("/bar", &private_message(), &subscribed, Some(&claim), false));
    assert!(can_receive("/foo", &private_message(), &subscribed, Some(&claim), false));
    // exclusions only restrict private updates
    assert!(can_receive("/bar", &public, &subscribed, Some(&claim), false));
}

#[test]
fn test_compiled_selector() {
    assert!(matches!(Selector::new("*"), Selector::Wildcard));
    assert!(Selector::new("*").matches("/anything"));

    let exact = Selector::new("/books/42");
    assert!(matches!(exact, Selector::Exact(_)));
    assert!(exact.matches("/books/42"));
    assert!(!exact.matches("/books/43"));

    let template = Selector::new("/books/{id}");
    assert_eq!(template.as_str(), "/books/{id}");
    assert!(template.matches("/books/42"));
    assert!(!template.matches("/films/42"));

    // a malformed template is still matched literally
    let broken = Selector::new("/books/{id");
    assert!(matches!(broken, Selector::Template(_, None)));
    assert!(broken.matches("/books/{id"));
    assert!(!broken.matches("/books/1"));
}

#[test]
fn test_template_selectors_are_compiled_once() {
    let selectors = ["/catalog/{section}/{id}"];
    let started = std::time::Instant::now();
    for i in 0..10_000 {
        assert!(matches_selectors(&format!("/catalog/books/{i}"), &selectors));
    }
    assert!(
        started.elapsed() < std::time::Duration::from_secs(2),
        "matching took {:?}",
        started.elapsed()
    );
}

#[test]
fn test_claim_keeps_absent_and_empty_lists_apart() {
    let absent = claim(json!({}));
    assert_eq!(absent.publish, None);

    let empty = claim(json!({"publish": []}));
    assert_eq!(empty.publish, Some(vec![]));

    let scalar = claim(json!({"publish": "*", "payload": null}));
    assert_eq!(scalar.publish, None);
    assert_eq!(scalar.payload, None);

    let token = AuthToken::from_claims(json!({"sub": "nobody"}));
    assert!(token.claim().is_none());
}

#[test]
fn test_authenticator_round_trip_with_signed_token() {
    let granted = claim(json!({"publish": ["*"], "payload": {"user": 1}}));
    let token = sign(&granted, KEY, "HS256", None).unwrap();

    let authenticator = Authenticator::new(KEY, "HS256").unwrap();
    let decoded = authenticator.authenticate(&bearer(&token)).unwrap().unwrap();
    assert_eq!(decoded.claim(), Some(&granted));
}

#[test]
fn test_authenticator_anonymous_without_token() {
    let authenticator = Authenticator::new(KEY, "HS256").unwrap();
    assert_eq!(authenticator.authenticate(&HeaderMap::new()), Ok(None));
}

#[test]
fn test_authenticator_rejects_bad_tokens() {
    let authenticator = Authenticator::new(KEY, "HS256").unwrap();
    let granted = claim(json!({"publish": ["*"]}));

    let wrong_key = sign(&granted, "another key", "HS256", None).unwrap();
    assert_eq!(
        authenticator.authenticate(&bearer(&wrong_key)),
        Err(AuthError::InvalidToken)
    );

    let expired = sign(&granted, KEY, "HS256", Some(-60)).unwrap();
    assert_eq!(
        authenticator.authenticate(&bearer(&expired)),
        Err(AuthError::TokenExpired)
    );

    assert_eq!(
        authenticator.authenticate(&bearer("not-a-jwt")),
        Err(AuthError::Malformed)
    );
}

#[test]
fn test_extract_token_header_wins_over_cookie() {
    let mut headers = bearer("from-header");
    headers.insert(
        header::COOKIE,
        HeaderValue::from_str(&format!("theme=dark; {AUTHORIZATION_COOKIE}=from-cookie")).unwrap(),
    );
    assert_eq!(extract_token(&headers).as_deref(), Some("from-header"));

    headers.remove(header::AUTHORIZATION);
    assert_eq!(extract_token(&headers).as_deref(), Some("from-cookie"));
}

#[test]
fn test_sign_rejects_asymmetric_algorithms() {
    assert!(sign(&Claim::default(), KEY, "RS256", None).is_err());
}

#[test]
fn test_cors_without_origin_adds_nothing() {
    let policy = CorsPolicy::new("*", "*");
    let mut headers = HeaderMap::new();
    policy.decorate(&Method::GET, None, &mut headers);
    assert!(headers.is_empty());
}

#[test]
fn test_cors_rejects_unlisted_origin() {
    let policy = CorsPolicy::new("http://good.example", "*");
    let mut headers = HeaderMap::new();
    policy.decorate(&Method::GET, Some("http://evil.example"), &mut headers);
    assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[test]
fn test_cors_wildcard_echoes_origin() {
    let policy = CorsPolicy::new("*", "http://publisher.example");
    let mut headers = HeaderMap::new();
    policy.decorate(&Method::GET, Some("http://evil.example"), &mut headers);
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://evil.example"
    );
    assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(), "true");
    assert_eq!(headers.get(header::ACCESS_CONTROL_MAX_AGE).unwrap(), "3600");

    // publishing uses its own list
    assert!(!policy.is_allowed(&Method::POST, "http://evil.example"));
    assert!(policy.is_allowed(&Method::POST, "http://publisher.example"));
}
