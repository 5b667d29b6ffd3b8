mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    HubSettings, JwtSettings, SUPPORTED_ALGORITHMS, ServerSettings, Settings, parse_origins,
};

/// Loads the configuration from the default file and `MERCURE_*` environment variables
/// Merges the configuration with default values
/// Returns a `Settings` struct; call `Settings::validate` before starting a hub
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("MERCURE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(merge(partial, Settings::default()))
}

fn merge(partial: PartialSettings, default: Settings) -> Settings {
    let server = partial.server;
    let hub = partial.hub;
    let jwt = partial.jwt;

    Settings {
        server: ServerSettings {
            addr: server
                .as_ref()
                .and_then(|s| s.addr.clone())
                .unwrap_or(default.server.addr),
            cors_allowed_origins: server
                .as_ref()
                .and_then(|s| s.cors_allowed_origins.clone())
                .unwrap_or(default.server.cors_allowed_origins),
            publish_allowed_origins: server
                .as_ref()
                .and_then(|s| s.publish_allowed_origins.clone())
                .unwrap_or(default.server.publish_allowed_origins),
            log_level: server
                .as_ref()
                .and_then(|s| s.log_level.clone())
                .unwrap_or(default.server.log_level),
        },
        hub: HubSettings {
            transport_url: hub
                .as_ref()
                .and_then(|h| h.transport_url.clone())
                .unwrap_or(default.hub.transport_url),
            storage_url: hub
                .as_ref()
                .and_then(|h| h.storage_url.clone())
                .or(default.hub.storage_url),
            metrics_url: hub
                .as_ref()
                .and_then(|h| h.metrics_url.clone())
                .or(default.hub.metrics_url),
            allow_anonymous: hub
                .as_ref()
                .and_then(|h| h.allow_anonymous)
                .unwrap_or(default.hub.allow_anonymous),
            subscriptions: hub
                .as_ref()
                .and_then(|h| h.subscriptions)
                .unwrap_or(default.hub.subscriptions),
        },
        jwt: JwtSettings {
            key: jwt.as_ref().and_then(|j| j.key.clone()).or(default.jwt.key),
            algorithm: jwt
                .as_ref()
                .and_then(|j| j.algorithm.clone())
                .unwrap_or(default.jwt.algorithm),
            publisher_key: jwt
                .as_ref()
                .and_then(|j| j.publisher_key.clone())
                .or(default.jwt.publisher_key),
            publisher_algorithm: jwt
                .as_ref()
                .and_then(|j| j.publisher_algorithm.clone())
                .or(default.jwt.publisher_algorithm),
            subscriber_key: jwt
                .as_ref()
                .and_then(|j| j.subscriber_key.clone())
                .or(default.jwt.subscriber_key),
            subscriber_algorithm: jwt
                .as_ref()
                .and_then(|j| j.subscriber_algorithm.clone())
                .or(default.jwt.subscriber_algorithm),
        },
    }
}

#[cfg(test)]
mod tests;
