//! Live delivery through the backend send endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing;

use crate::templates::ProviderPayload;

/// Why a single delivery attempt failed. The display string is what ends up
/// on the contact as its error message.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The endpoint answered with a non-success status
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// The request never got a response
    #[error("Network error connecting to backend API")]
    Network(#[source] reqwest::Error),

    /// Synthetic failure in simulate mode
    #[error("Simulated delivery failure")]
    Simulated,
}

/// Something that can deliver one payload to one phone number.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, payload: &ProviderPayload, phone: &str) -> Result<(), DeliveryError>;
}

/// Request body accepted by the send endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    message_payload: &'a ProviderPayload,
    phone: &'a str,
}

/// Posts payloads to the backend send endpoint.
///
/// Timeouts are whatever the shared [`Client`] was built with.
pub struct HttpSender {
    client: Client,
    endpoint: String,
}

impl HttpSender {
    pub fn new(client: Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl MessageSender for HttpSender {
    async fn send(&self, payload: &ProviderPayload, phone: &str) -> Result<(), DeliveryError> {
        let body = SendRequest {
            message_payload: payload,
            phone,
        };

        match self.client.post(&self.endpoint).json(&body).send().await {
            Ok(resp) => {
                let status = resp.status();

                if status.is_success() {
                    tracing::debug!(
                        phone = phone,
                        status_code = status.as_u16(),
                        "send_accepted"
                    );
                    return Ok(());
                }

                let text = resp.text().await.unwrap_or_default();
                let message = rejection_message(status.as_u16(), &text);

                tracing::warn!(
                    phone = phone,
                    status_code = status.as_u16(),
                    error = %message,
                    "send_rejected"
                );

                Err(DeliveryError::Rejected {
                    status: status.as_u16(),
                    message,
                })
            }
            Err(e) => {
                if e.is_timeout() {
                    tracing::error!(phone = phone, error = %e, "send_timeout");
                } else if e.is_connect() {
                    tracing::error!(phone = phone, error = %e, "send_connect_error");
                } else {
                    tracing::error!(phone = phone, error = %e, "send_error");
                }
                Err(DeliveryError::Network(e))
            }
        }
    }
}

/// Error message for a rejected send.
///
/// Looks for `error` (a string, or an object with `message`) and then
/// `message` in a JSON body, falling back to `HTTP <code>`.
pub fn rejection_message(status: u16, body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    parsed
        .as_ref()
        .and_then(|value| {
            let from_error = match value.get("error") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Object(obj)) => {
                    obj.get("message").and_then(Value::as_str).map(String::from)
                }
                _ => None,
            };

            from_error.or_else(|| value.get("message").and_then(Value::as_str).map(String::from))
        })
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status))
}
