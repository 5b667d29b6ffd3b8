//! The `security` module decides who may publish and subscribe to what.
//!
//! - `uri_template` and `matcher`: topic selector matching and the publish,
//!   subscribe and receive rules.
//! - `claim`: the `mercure` claim decoded from a token.
//! - `authenticator`: token extraction and verification.
//! - `cors`: CORS response headers.
//! - `jwt`: token signing.

pub mod authenticator;
pub mod claim;
pub mod cors;
pub mod jwt;
pub mod matcher;
pub mod uri_template;

pub use authenticator::{AuthError, Authenticator};
pub use claim::{AuthToken, Claim};
pub use cors::CorsPolicy;

#[cfg(test)]
mod tests;
