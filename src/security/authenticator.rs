//! Token extraction and verification.
//!
//! The token is read from the `Authorization: Bearer` header, falling back to
//! the `mercureAuthorization` cookie. A request without a token is anonymous,
//! which is not an error: callers decide whether anonymous access is allowed.

use std::collections::HashSet;
use std::str::FromStr;

use axum::http::{HeaderMap, header};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::Value;

use crate::security::claim::AuthToken;
use crate::utils::error::HubResult;

/// Name of the cookie carrying the token when no header is sent.
pub const AUTHORIZATION_COOKIE: &str = "mercureAuthorization";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Cannot decode token.")]
    Malformed,

    #[error("Invalid token signature.")]
    InvalidToken,

    #[error("Your token has expired.")]
    TokenExpired,
}

/// Verifies tokens against one key and algorithm.
///
/// Key material is decoded once at construction.
#[derive(Clone)]
pub struct Authenticator {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    pub fn new(key: &str, algorithm: &str) -> HubResult<Self> {
        let algorithm = Algorithm::from_str(algorithm)?;
        let key = match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                DecodingKey::from_secret(key.as_bytes())
            }
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => DecodingKey::from_rsa_pem(key.as_bytes())?,
            Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(key.as_bytes())?,
            Algorithm::EdDSA => DecodingKey::from_ed_pem(key.as_bytes())?,
        };

        let mut validation = Validation::new(algorithm);
        // Hub tokens carry no mandatory registered claims; `exp` is checked when present.
        validation.required_spec_claims = HashSet::new();
        validation.validate_aud = false;
        validation.leeway = 0;

        Ok(Self { key, validation })
    }

    /// Returns the decoded token, `Ok(None)` for anonymous requests.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Option<AuthToken>, AuthError> {
        match extract_token(headers) {
            Some(token) => self.verify(&token).map(Some),
            None => Ok(None),
        }
    }

    pub fn verify(&self, token: &str) -> Result<AuthToken, AuthError> {
        let data = jsonwebtoken::decode::<Value>(token, &self.key, &self.validation).map_err(
            |err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => AuthError::Malformed,
                _ => AuthError::InvalidToken,
            },
        )?;

        Ok(AuthToken::from_claims(data.claims))
    }
}

/// Reads the raw token, the `Authorization` header taking precedence over the cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            let (scheme, token) = value.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim().to_string())
        })
        .filter(|token| !token.is_empty());

    from_header.or_else(|| {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|cookies| cookies.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == AUTHORIZATION_COOKIE)
            .map(|(_, value)| value.trim().to_string())
            .filter(|token| !token.is_empty())
    })
}

