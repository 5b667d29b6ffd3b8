//! Authorization claims carried by hub tokens.
//!
//! A token authorizes hub operations through its `mercure` claim:
//!
//! ```json
//! {"mercure": {"publish": ["/books/{id}"], "subscribe": ["*"], "payload": {"user": 1}}}
//! ```
//!
//! The three states of each allow-list are kept apart: a token without a
//! `mercure` claim, a claim without a `publish` list, and a claim with an
//! empty `publish` list all grant different rights.

use serde::Deserialize;
use serde_json::Value;

/// The decoded payload of a verified token.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthToken {
    pub mercure: Option<Claim>,
}

/// Selector lists granted by the `mercure` claim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Claim {
    /// `None` means no publish rights at all.
    pub publish: Option<Vec<String>>,
    pub publish_exclude: Vec<String>,
    /// `None` means no authenticated subscribe rights.
    pub subscribe: Option<Vec<String>>,
    pub subscribe_exclude: Vec<String>,
    pub payload: Option<Value>,
}

#[derive(Deserialize)]
struct RawToken {
    mercure: Option<Value>,
}

impl AuthToken {
    /// Builds a token from decoded JWT claims.
    pub fn from_claims(claims: Value) -> Self {
        let raw: RawToken = serde_json::from_value(claims).unwrap_or(RawToken { mercure: None });
        Self {
            mercure: raw.mercure.as_ref().and_then(Claim::from_value),
        }
    }

    pub fn claim(&self) -> Option<&Claim> {
        self.mercure.as_ref()
    }
}

impl Claim {
    /// Reads a claim object; anything but a JSON object is treated as no claim.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        Some(Self {
            publish: object.get("publish").and_then(selectors),
            publish_exclude: object.get("publish_exclude").and_then(selectors).unwrap_or_default(),
            subscribe: object.get("subscribe").and_then(selectors),
            subscribe_exclude: object
                .get("subscribe_exclude")
                .and_then(selectors)
                .unwrap_or_default(),
            payload: object.get("payload").filter(|p| !p.is_null()).cloned(),
        })
    }

    /// Encodes the claim as the JSON object signed into tokens.
    pub fn to_value(&self) -> Value {
        let mut object = serde_json::Map::new();
        if let Some(publish) = &self.publish {
            object.insert("publish".into(), Value::from(publish.clone()));
        }
        if !self.publish_exclude.is_empty() {
            object.insert("publish_exclude".into(), Value::from(self.publish_exclude.clone()));
        }
        if let Some(subscribe) = &self.subscribe {
            object.insert("subscribe".into(), Value::from(subscribe.clone()));
        }
        if !self.subscribe_exclude.is_empty() {
            object.insert(
                "subscribe_exclude".into(),
                Value::from(self.subscribe_exclude.clone()),
            );
        }
        if let Some(payload) = &self.payload {
            object.insert("payload".into(), payload.clone());
        }
        Value::Object(object)
    }
}

/// An array of strings; any other shape (null, scalar, object) counts as absent.
fn selectors(value: &Value) -> Option<Vec<String>> {
    value.as_array().map(|items| {
        items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect()
    })
}
