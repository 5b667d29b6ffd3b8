use serde::{Deserialize, Serialize};

/// Represents a published update in the hub.
///
/// A message is immutable once built. It travels in two forms:
///
/// - the Server-Sent Events frame written to subscribers, see [`Message::to_sse`];
/// - a JSON object used by the Redis backends and for replay:
///
/// ```json
/// {"id":"urn:uuid:...","data":"hello","private":false,"event":"greeting","retry":3000}
/// ```
///
/// # Fields
///
/// - `id` - Unique identifier, a UUID when supplied by the publisher.
/// - `data` - Optional payload, possibly spanning several lines.
/// - `private` - Private updates are only delivered to authorized subscribers.
/// - `event` - Optional SSE event type.
/// - `retry` - Optional SSE reconnection delay in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default, alias = "type", skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<u64>,
}

impl Message {
    pub fn new(id: impl Into<String>, data: Option<String>) -> Self {
        Self {
            id: id.into(),
            data,
            private: false,
            event: None,
            retry: None,
        }
    }

    /// Builds a message with a freshly generated id.
    pub fn with_generated_id(data: Option<String>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), data)
    }

    /// Renders the message as one SSE frame:
    /// `id:<id>\n[event:<type>\n][retry:<n>\n]data:<line>\n...\n\n`.
    pub fn to_sse(&self) -> String {
        let mut frame = format!("id:{}\n", self.id);
        if let Some(event) = &self.event {
            frame.push_str(&format!("event:{event}\n"));
        }
        if let Some(retry) = self.retry {
            frame.push_str(&format!("retry:{retry}\n"));
        }
        if let Some(data) = &self.data {
            for line in data.split('\n') {
                frame.push_str("data:");
                frame.push_str(line.strip_suffix('\r').unwrap_or(line));
                frame.push('\n');
            }
        }
        frame.push('\n');
        frame
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
