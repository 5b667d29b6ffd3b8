//! Publication of updates: `POST /.well-known/mercure`.
//!
//! The body is form-encoded with the fields `topic` (required), `data`,
//! `private`, `id` (a UUID), `type` and `retry`. On success the hub answers
//! `201 Created` with the update's id as a plain-text body.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::to_bytes;
use axum::extract::Request;
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::error;
use uuid::Uuid;

use crate::broker::message::Message;
use crate::security::matcher::can_publish;
use crate::server::controller::{Controller, HUB_PATH, HubContext};
use crate::utils::error::HttpError;

/// Largest accepted publish body.
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// A decoded, validated publish body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishForm {
    pub topic: String,
    pub data: Option<String>,
    pub private: bool,
    pub id: Option<String>,
    pub event: Option<String>,
    pub retry: Option<u64>,
}

struct Field {
    value: String,
    scalar: bool,
}

impl PublishForm {
    pub fn parse(body: &[u8]) -> Result<Self, HttpError> {
        let mut fields: HashMap<String, Field> = HashMap::new();
        for (key, value) in url::form_urlencoded::parse(body) {
            // `topic[]=a` or `topic[x]=a` makes the field a list; the last value wins otherwise.
            let (name, scalar) = match key.find('[') {
                Some(index) => (key[..index].to_string(), false),
                None => (key.into_owned(), true),
            };
            fields.insert(
                name,
                Field {
                    value: value.into_owned(),
                    scalar,
                },
            );
        }

        let topic = match fields.remove("topic") {
            Some(Field { value, scalar: true }) if !value.is_empty() => value,
            _ => return Err(HttpError::bad_request("Invalid topic parameter.")),
        };

        let data = match fields.remove("data") {
            Some(Field { value, scalar: true }) => Some(value),
            Some(_) => return Err(HttpError::bad_request("Invalid data parameter.")),
            None => None,
        };

        let id = match fields.remove("id").filter(|f| !f.value.is_empty()) {
            Some(field) if field.scalar && Uuid::parse_str(&field.value).is_ok() => {
                Some(field.value)
            }
            Some(_) => return Err(HttpError::bad_request("Invalid UUID.")),
            None => None,
        };

        let retry = match fields.remove("retry").filter(|f| !f.value.is_empty()) {
            Some(field) => Some(
                field
                    .value
                    .parse()
                    .map_err(|_| HttpError::bad_request("Invalid retry parameter."))?,
            ),
            None => None,
        };

        let private = fields
            .remove("private")
            .is_some_and(|f| !matches!(f.value.to_lowercase().as_str(), "" | "0" | "false" | "off"));

        let event = fields
            .remove("type")
            .filter(|f| f.scalar && !f.value.is_empty())
            .map(|f| f.value);

        Ok(Self {
            topic,
            data,
            private,
            id,
            event,
            retry,
        })
    }

    pub fn into_message(self) -> (String, Message) {
        let id = self.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let message = Message {
            id,
            data: self.data,
            private: self.private,
            event: self.event,
            retry: self.retry,
        };
        (self.topic, message)
    }
}

pub struct PublishController {
    context: Arc<HubContext>,
}

impl PublishController {
    pub fn new(context: Arc<HubContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Controller for PublishController {
    fn matches(&self, request: &Request) -> bool {
        request.uri().path() == HUB_PATH
    }

    async fn handle(&self, request: Request, _peer: SocketAddr) -> Result<Response, HttpError> {
        if request.method() != Method::POST {
            return Err(HttpError::method_not_allowed());
        }

        let token = self
            .context
            .publisher_auth
            .authenticate(request.headers())
            .map_err(|e| HttpError::forbidden(e.to_string()))?
            .ok_or_else(|| HttpError::forbidden("Invalid auth token."))?;

        let claim = token.mercure.ok_or_else(|| {
            HttpError::forbidden("Provided auth token doesn't contain the \"mercure\" claim.")
        })?;
        let Some(allowed) = &claim.publish else {
            return Err(HttpError::forbidden(
                "You are not authorized to publish on this hub.",
            ));
        };

        let body = to_bytes(request.into_body(), MAX_BODY_SIZE)
            .await
            .map_err(|_| HttpError::bad_request("Invalid request body."))?;
        let form = PublishForm::parse(&body)?;

        if form.private && allowed.is_empty() {
            return Err(HttpError::forbidden(
                "You are not allowed to dispatch private updates.",
            ));
        }

        if !can_publish(&form.topic, &claim, form.private) {
            return Err(HttpError::forbidden("You are not allowed to update this topic."));
        }

        let (topic, message) = form.into_message();
        let id = self
            .context
            .broker
            .publish(&topic, message)
            .await
            .map_err(|e| {
                error!("Failed to publish on {}: {}", topic, e);
                HttpError::internal("Unable to publish the update.")
            })?;

        Ok((
            StatusCode::CREATED,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            id,
        )
            .into_response())
    }
}
