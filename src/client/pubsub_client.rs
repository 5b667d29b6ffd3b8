use std::net::SocketAddr;

use uuid::Uuid;

/// Namespace of the UUIDv5 subscriber ids.
pub const CLIENT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x530344d8_a802_11ea_bb37_0242ac130002);

/// Represents a connected client of the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    /// Stable identifier derived from `addr` (UUIDv5 of `ip:port`).
    pub id: String,

    /// Remote address of the TCP connection.
    pub addr: SocketAddr,
}

impl Client {
    pub fn from_addr(addr: SocketAddr) -> Self {
        let name = format!("{}:{}", addr.ip(), addr.port());
        Self {
            id: Uuid::new_v5(&CLIENT_ID_NAMESPACE, name.as_bytes()).to_string(),
            addr,
        }
    }
}
