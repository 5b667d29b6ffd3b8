//! The `client` module defines the identity of a connected subscriber.
//!
//! A subscriber is identified by its remote address, so every stream opened
//! over one TCP connection shares an id and the hub can find all of its
//! subscriptions again when that connection closes.

pub mod pubsub_client;
pub use pubsub_client::Client;
