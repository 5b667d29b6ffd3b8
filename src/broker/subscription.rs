use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Path prefix of the subscriptions introspection API.
pub const SUBSCRIPTIONS_PATH: &str = "/.well-known/mercure/subscriptions";

/// JSON-LD context of subscription documents.
pub const JSON_LD_CONTEXT: &str = "https://mercure.rocks/";

/// Characters escaped when a topic becomes a path segment of a subscription id.
const TOPIC_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

/// One (subscriber, topic selector) binding.
///
/// The `id` doubles as the topic on which changes to the subscription are
/// announced, so it stays the same for the whole life of the binding.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub subscriber: String,
    pub topic: String,
    pub active: bool,
    #[serde(default)]
    pub payload: Option<Value>,
}

impl Subscription {
    pub fn new(topic: &str, subscriber: &str, payload: Option<Value>) -> Self {
        Self {
            id: subscription_id(topic, subscriber),
            subscriber: subscriber.to_string(),
            topic: topic.to_string(),
            active: true,
            payload,
        }
    }

    /// Returns a copy flagged inactive, announced when the subscriber leaves.
    pub fn deactivated(&self) -> Self {
        Self {
            active: false,
            ..self.clone()
        }
    }
}

/// `/.well-known/mercure/subscriptions/{urlencoded topic}/{subscriber}`
pub fn subscription_id(topic: &str, subscriber: &str) -> String {
    format!(
        "{SUBSCRIPTIONS_PATH}/{}/{subscriber}",
        utf8_percent_encode(topic, TOPIC_SEGMENT)
    )
}

#[derive(Serialize)]
struct SubscriptionDocument<'a> {
    #[serde(rename = "@context")]
    context: &'static str,
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    subscriber: &'a str,
    topic: &'a str,
    active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<&'a Value>,
}

impl Serialize for Subscription {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SubscriptionDocument {
            context: JSON_LD_CONTEXT,
            id: &self.id,
            kind: "Subscription",
            subscriber: &self.subscriber,
            topic: &self.topic,
            active: self.active,
            payload: self.payload.as_ref(),
        }
        .serialize(serializer)
    }
}
