//! The `server` module exposes the hub over HTTP.
//!
//! - `hub`: lifecycle, accept loop and connection cleanup.
//! - `handler`: the ordered controller chain and CORS decoration.
//! - `controller`: the `Controller` trait and the state shared by controllers.
//! - `health`, `subscribe`, `publish`, `subscriptions`: the endpoints.

pub mod controller;
pub mod handler;
pub mod health;
pub mod hub;
pub mod publish;
pub mod subscribe;
pub mod subscriptions;

pub use handler::{RequestHandler, router};
pub use hub::{Hub, HubState, ShutdownSignal};
