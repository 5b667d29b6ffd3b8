use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::utils::error::{HubError, HubResult};

/// Algorithms accepted for the `jwt.*algorithm` settings.
pub const SUPPORTED_ALGORITHMS: [&str; 8] = [
    "HS256", "HS384", "HS512", "RS256", "RS384", "RS512", "ES256", "ES384",
];

/// Top-level configuration settings for the hub.
///
/// Includes settings for the HTTP server, the hub backends and token verification.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub hub: HubSettings,
    pub jwt: JwtSettings,
}

/// Configuration settings for the HTTP server.
///
/// Defines the listen address, the CORS allow-lists and the log level.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerSettings {
    pub addr: String,
    pub cors_allowed_origins: String,
    pub publish_allowed_origins: String,
    pub log_level: String,
}

/// Configuration settings for the hub backends and protocol options.
///
/// `storage_url` and `metrics_url` fall back to `transport_url` when unset.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HubSettings {
    pub transport_url: String,
    pub storage_url: Option<String>,
    pub metrics_url: Option<String>,
    pub allow_anonymous: bool,
    pub subscriptions: bool,
}

/// Keys and algorithms used to verify publisher and subscriber tokens.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct JwtSettings {
    pub key: Option<String>,
    pub algorithm: String,
    pub publisher_key: Option<String>,
    pub publisher_algorithm: Option<String>,
    pub subscriber_key: Option<String>,
    pub subscriber_algorithm: Option<String>,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub hub: Option<PartialHubSettings>,
    pub jwt: Option<PartialJwtSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub addr: Option<String>,
    pub cors_allowed_origins: Option<String>,
    pub publish_allowed_origins: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialHubSettings {
    pub transport_url: Option<String>,
    pub storage_url: Option<String>,
    pub metrics_url: Option<String>,
    pub allow_anonymous: Option<bool>,
    pub subscriptions: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PartialJwtSettings {
    pub key: Option<String>,
    pub algorithm: Option<String>,
    pub publisher_key: Option<String>,
    pub publisher_algorithm: Option<String>,
    pub subscriber_key: Option<String>,
    pub subscriber_algorithm: Option<String>,
}

/// Provides default values for `Settings`.
///
/// Every value has a default except the JWT key, which `validate` requires.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                addr: "127.0.0.1:3000".to_string(),
                cors_allowed_origins: "*".to_string(),
                publish_allowed_origins: "*".to_string(),
                log_level: "info".to_string(),
            },
            hub: HubSettings {
                transport_url: "php://localhost?size=1000".to_string(),
                storage_url: None,
                metrics_url: None,
                allow_anonymous: false,
                subscriptions: false,
            },
            jwt: JwtSettings {
                key: None,
                algorithm: "HS256".to_string(),
                publisher_key: None,
                publisher_algorithm: None,
                subscriber_key: None,
                subscriber_algorithm: None,
            },
        }
    }
}

impl Settings {
    /// Checks the settings can start a hub. Failures are fatal at startup.
    pub fn validate(&self) -> HubResult<()> {
        self.socket_addr()?;

        if self.jwt.publisher_key().is_none() {
            return Err(HubError::Config(
                "one of \"jwt.key\" or \"jwt.publisher_key\" is required".to_string(),
            ));
        }

        let algorithms = [
            Some(self.jwt.algorithm.as_str()),
            self.jwt.publisher_algorithm.as_deref(),
            self.jwt.subscriber_algorithm.as_deref(),
        ];
        for algorithm in algorithms.into_iter().flatten() {
            if !SUPPORTED_ALGORITHMS.contains(&algorithm) {
                return Err(HubError::Config(format!(
                    "unsupported JWT algorithm \"{algorithm}\""
                )));
            }
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> HubResult<SocketAddr> {
        self.server
            .addr
            .parse()
            .map_err(|_| HubError::Config(format!("invalid address \"{}\"", self.server.addr)))
    }
}

impl HubSettings {
    pub fn storage_dsn(&self) -> &str {
        self.storage_url.as_deref().unwrap_or(&self.transport_url)
    }

    pub fn metrics_dsn(&self) -> &str {
        self.metrics_url
            .as_deref()
            .unwrap_or_else(|| self.storage_dsn())
    }
}

impl JwtSettings {
    pub fn publisher_key(&self) -> Option<&str> {
        self.publisher_key.as_deref().or(self.key.as_deref())
    }

    pub fn publisher_algorithm(&self) -> &str {
        self.publisher_algorithm
            .as_deref()
            .unwrap_or(&self.algorithm)
    }

    /// Subscribers share the publisher key when neither a dedicated nor a default key is set.
    pub fn subscriber_key(&self) -> Option<&str> {
        self.subscriber_key
            .as_deref()
            .or(self.key.as_deref())
            .or(self.publisher_key.as_deref())
    }

    pub fn subscriber_algorithm(&self) -> &str {
        self.subscriber_algorithm
            .as_deref()
            .or(self.publisher_algorithm.as_deref().filter(|_| {
                self.subscriber_key.is_none() && self.key.is_none()
            }))
            .unwrap_or(&self.algorithm)
    }
}

/// Splits an origin allow-list on spaces, commas and semicolons.
pub fn parse_origins(list: &str) -> Vec<String> {
    list.split([' ', ',', ';'])
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}
