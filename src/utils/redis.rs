//! Helpers shared by the Redis transport, storage and metrics backends.

use redis::aio::MultiplexedConnection;
use url::Url;

use crate::utils::error::{HubError, HubResult};

/// Returns true for `redis://` and `rediss://` DSNs.
pub fn is_redis_dsn(dsn: &Url) -> bool {
    matches!(dsn.scheme(), "redis" | "rediss")
}

pub fn open_client(dsn: &Url) -> HubResult<redis::Client> {
    if !is_redis_dsn(dsn) {
        return Err(HubError::InvalidDsn(dsn.to_string()));
    }
    Ok(redis::Client::open(dsn.as_str())?)
}

/// Opens a multiplexed connection and checks it answers `PING`.
pub async fn connect(client: &redis::Client) -> HubResult<MultiplexedConnection> {
    let mut conn = client.get_multiplexed_async_connection().await?;
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    Ok(conn)
}

/// Connection-level failures are fatal to the hub, command errors are not.
pub fn is_connection_error(err: &redis::RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal()
}
