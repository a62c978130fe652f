//! Notification transports

use crate::http_client;
use aiops_common::{CollaboratorsConfig, Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// Direct email delivery
#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Send an email; returns the message id
    async fn send(&self, from: &str, to: &[String], subject: &str, body: &str) -> Result<String>;
}

/// Topic broadcast delivery
#[async_trait]
pub trait BroadcastTransport: Send + Sync {
    /// Publish to a topic; returns the message id
    async fn publish(&self, topic: &str, subject: &str, body: &str) -> Result<String>;
}

/// HTTP-backed notification client covering both transports
pub struct HttpNotifier {
    client: reqwest::Client,
    email_endpoint: String,
    broadcast_endpoint: String,
    timeout: Duration,
}

impl HttpNotifier {
    pub fn new(config: &CollaboratorsConfig) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            email_endpoint: config.email_endpoint.clone(),
            broadcast_endpoint: config.broadcast_endpoint.clone(),
            timeout: Duration::from_secs(config.read_timeout_seconds),
        })
    }

    async fn post(&self, url: String, body: serde_json::Value) -> Result<String> {
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Network(format!("notification request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Notification(format!(
                "notification transport returned status {}",
                response.status()
            )));
        }
        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Network(format!("bad notification response: {e}")))?;
        payload["message_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Notification("response missing message_id".to_string()))
    }
}

#[async_trait]
impl EmailTransport for HttpNotifier {
    async fn send(&self, from: &str, to: &[String], subject: &str, body: &str) -> Result<String> {
        info!(recipients = to.len(), subject, "sending email");
        self.post(
            format!("{}/v1/messages", self.email_endpoint),
            serde_json::json!({
                "from": from,
                "to": to,
                "subject": subject,
                "body": body,
            }),
        )
        .await
    }
}

#[async_trait]
impl BroadcastTransport for HttpNotifier {
    async fn publish(&self, topic: &str, subject: &str, body: &str) -> Result<String> {
        info!(topic, subject, "publishing broadcast");
        self.post(
            format!("{}/v1/publish", self.broadcast_endpoint),
            serde_json::json!({
                "topic": topic,
                "subject": subject,
                "body": body,
            }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn email_send_returns_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_partial_json(json!({"from": "noreply@aiops.example.com"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"message_id": "msg-1"})),
            )
            .mount(&server)
            .await;

        let config = CollaboratorsConfig {
            email_endpoint: server.uri(),
            broadcast_endpoint: server.uri(),
            ..Default::default()
        };
        let notifier = HttpNotifier::new(&config).unwrap();
        let id = notifier
            .send(
                "noreply@aiops.example.com",
                &["oncall@example.com".to_string()],
                "incident",
                "body",
            )
            .await
            .unwrap();
        assert_eq!(id, "msg-1");
    }

    #[tokio::test]
    async fn broadcast_failure_surfaces_as_notification_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/publish"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let config = CollaboratorsConfig {
            email_endpoint: server.uri(),
            broadcast_endpoint: server.uri(),
            ..Default::default()
        };
        let notifier = HttpNotifier::new(&config).unwrap();
        let err = notifier
            .publish("incidents", "subject", "body")
            .await
            .unwrap_err();
        assert_eq!(err.category(), "notification");
    }
}
