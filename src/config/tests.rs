use std::env;
use std::fs;

use serial_test::serial;
use tempfile::TempDir;

use super::settings::Settings;
use super::{load_config, parse_origins};

fn with_jwt_key() -> Settings {
    let mut settings = Settings::default();
    settings.jwt.key = Some("!ChangeMe!".to_string());
    settings
}

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.addr, "127.0.0.1:3000");
    assert_eq!(settings.server.cors_allowed_origins, "*");
    assert_eq!(settings.hub.transport_url, "php://localhost?size=1000");
    assert!(!settings.hub.allow_anonymous);
    assert!(!settings.hub.subscriptions);
    assert_eq!(settings.jwt.algorithm, "HS256");
    assert!(settings.jwt.key.is_none());
}

#[test]
fn test_validate_requires_a_key() {
    assert!(Settings::default().validate().is_err());
    assert!(with_jwt_key().validate().is_ok());

    let mut publisher_only = Settings::default();
    publisher_only.jwt.publisher_key = Some("publisher".to_string());
    assert!(publisher_only.validate().is_ok());
}

#[test]
fn test_validate_rejects_unknown_algorithm_and_address() {
    let mut settings = with_jwt_key();
    settings.jwt.subscriber_algorithm = Some("none".to_string());
    assert!(settings.validate().is_err());

    let mut settings = with_jwt_key();
    settings.server.addr = "localhost".to_string();
    assert!(settings.validate().is_err());
}

#[test]
fn test_backend_dsn_fallbacks() {
    let mut settings = Settings::default();
    assert_eq!(settings.hub.storage_dsn(), "php://localhost?size=1000");
    assert_eq!(settings.hub.metrics_dsn(), "php://localhost?size=1000");

    settings.hub.storage_url = Some("redis://localhost".to_string());
    assert_eq!(settings.hub.metrics_dsn(), "redis://localhost");

    settings.hub.metrics_url = Some("null://".to_string());
    assert_eq!(settings.hub.metrics_dsn(), "null://");
}

#[test]
fn test_key_resolution() {
    let mut settings = with_jwt_key();
    assert_eq!(settings.jwt.publisher_key(), Some("!ChangeMe!"));
    assert_eq!(settings.jwt.subscriber_key(), Some("!ChangeMe!"));

    settings.jwt.publisher_key = Some("pub".to_string());
    settings.jwt.subscriber_key = Some("sub".to_string());
    settings.jwt.subscriber_algorithm = Some("HS512".to_string());
    assert_eq!(settings.jwt.publisher_key(), Some("pub"));
    assert_eq!(settings.jwt.publisher_algorithm(), "HS256");
    assert_eq!(settings.jwt.subscriber_key(), Some("sub"));
    assert_eq!(settings.jwt.subscriber_algorithm(), "HS512");
}

#[test]
fn test_subscriber_falls_back_to_publisher_key() {
    let mut settings = Settings::default();
    settings.jwt.publisher_key = Some("pub".to_string());
    settings.jwt.publisher_algorithm = Some("HS384".to_string());
    assert_eq!(settings.jwt.subscriber_key(), Some("pub"));
    assert_eq!(settings.jwt.subscriber_algorithm(), "HS384");
}

#[test]
fn test_parse_origins() {
    assert_eq!(
        parse_origins("http://a.example, http://b.example;http://c.example  *"),
        vec![
            "http://a.example",
            "http://b.example",
            "http://c.example",
            "*"
        ]
    );
    assert!(parse_origins("  ").is_empty());
}

#[test]
#[serial]
fn test_load_config_from_env() {
    temp_env::with_vars(
        [
            ("MERCURE_JWT__KEY", Some("env-secret")),
            ("MERCURE_HUB__ALLOW_ANONYMOUS", Some("true")),
            ("MERCURE_SERVER__ADDR", Some("0.0.0.0:8080")),
        ],
        || {
            let cfg = load_config().expect("load_config failed");
            assert_eq!(cfg.jwt.key.as_deref(), Some("env-secret"));
            assert!(cfg.hub.allow_anonymous);
            assert_eq!(cfg.server.addr, "0.0.0.0:8080");
            assert_eq!(cfg.hub.transport_url, "php://localhost?size=1000");
        },
    );
}

#[test]
#[serial]
fn test_load_config_from_file_overrides_defaults() {
    // load_config reads config/default.toml relative to the working directory
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    let toml = r#"
        [server]
        addr = "0.0.0.0:9000"
        publish_allowed_origins = "http://publisher.example"

        [hub]
        transport_url = "memory://localhost?size=10"
        subscriptions = true

        [jwt]
        publisher_key = "file_secret"
    "#;
    fs::write("config/default.toml", toml).expect("write config file");

    let result = load_config();
    env::set_current_dir(orig).expect("restore cwd");

    let cfg = result.expect("load_config failed");
    assert_eq!(cfg.server.addr, "0.0.0.0:9000");
    assert_eq!(cfg.server.publish_allowed_origins, "http://publisher.example");
    assert_eq!(cfg.server.cors_allowed_origins, "*");
    assert_eq!(cfg.hub.transport_url, "memory://localhost?size=10");
    assert!(cfg.hub.subscriptions);
    assert_eq!(cfg.jwt.publisher_key(), Some("file_secret"));
    assert!(cfg.validate().is_ok());
}
