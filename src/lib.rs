//! # Mercure hub
//!
//! `mercure-hub` is a publish/subscribe hub speaking the Mercure protocol over
//! plain HTTP. Publishers `POST` updates to `/.well-known/mercure`; subscribers
//! keep a Server-Sent Events stream open on the same path and receive every
//! update whose topic matches one of their selectors (exact topics or URI
//! templates). Access is controlled with JWTs, and missed updates can be
//! replayed from a `Last-Event-ID`.
//!
//! ## Core Modules
//!
//! - `broker`: messages, subscriptions and the publish/replay engine.
//! - `client`: stable subscriber identities derived from the peer address.
//! - `config`: loading settings from `config/default` and `MERCURE_*` variables.
//! - `metrics`: the connected-users counter (in-process or Redis).
//! - `persistence`: update history and the subscription registry (null, in-process or Redis).
//! - `security`: token verification, claims, topic selectors and CORS.
//! - `server`: the HTTP controllers and the hub lifecycle.
//! - `transport`: live fan-out of updates (in-process or Redis pub/sub).
//! - `utils`: error types, logging and shared Redis helpers.

pub mod broker;
pub mod client;
pub mod config;
pub mod metrics;
pub mod persistence;
pub mod security;
pub mod server;
pub mod transport;
pub mod utils;
