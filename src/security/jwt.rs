//! Signing of hub tokens, used by the `generate-jwt` command and by tests.

use std::str::FromStr;

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Map, Value};

use crate::security::claim::Claim;
use crate::utils::error::{HubError, HubResult};

/// Signs a token carrying `claim` as its `mercure` claim.
///
/// Only HMAC algorithms are supported: the configured key is a shared secret.
pub fn sign(claim: &Claim, key: &str, algorithm: &str, ttl_secs: Option<i64>) -> HubResult<String> {
    let algorithm = Algorithm::from_str(algorithm)?;
    if !matches!(
        algorithm,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
    ) {
        return Err(HubError::Config(format!(
            "cannot sign tokens with {algorithm:?}, only HMAC algorithms are supported"
        )));
    }

    let mut claims = Map::new();
    claims.insert("mercure".to_string(), claim.to_value());
    if let Some(ttl) = ttl_secs {
        let exp = chrono::Utc::now().timestamp() + ttl;
        claims.insert("exp".to_string(), Value::from(exp));
    }

    let token = jsonwebtoken::encode(
        &Header::new(algorithm),
        &Value::Object(claims),
        &EncodingKey::from_secret(key.as_bytes()),
    )?;
    Ok(token)
}
