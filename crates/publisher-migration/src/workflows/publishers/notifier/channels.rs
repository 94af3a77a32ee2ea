use async_trait::async_trait;
use serde_json::json;

use super::templates::RenderedNotification;

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("notification endpoint rejected the message with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait EmailChannel: Send + Sync {
    async fn send(
        &self,
        recipients: &[String],
        message: &RenderedNotification,
    ) -> Result<(), NotificationError>;
}

#[async_trait]
pub trait ChatChannel: Send + Sync {
    async fn post(&self, text: &str) -> Result<(), NotificationError>;
}

/// Transactional email over a provider's JSON send endpoint.
#[derive(Debug, Clone)]
pub struct HttpEmailChannel {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
}

impl HttpEmailChannel {
    pub fn new(
        client: reqwest::Client,
        endpoint: String,
        api_key: Option<String>,
        from: String,
    ) -> Self {
        Self {
            client,
            endpoint,
            api_key,
            from,
        }
    }

    fn payload(&self, recipients: &[String], message: &RenderedNotification) -> serde_json::Value {
        json!({
            "from": self.from,
            "to": recipients,
            "subject": message.subject,
            "content": [
                { "type": mime::TEXT_PLAIN.essence_str(), "value": message.text },
                { "type": mime::TEXT_HTML.essence_str(), "value": message.html },
            ],
        })
    }
}

#[async_trait]
impl EmailChannel for HttpEmailChannel {
    async fn send(
        &self,
        recipients: &[String],
        message: &RenderedNotification,
    ) -> Result<(), NotificationError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&self.payload(recipients, message));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        ensure_accepted(request.send().await?).await
    }
}

/// Slack-compatible incoming webhook.
#[derive(Debug, Clone)]
pub struct SlackWebhookChannel {
    client: reqwest::Client,
    url: String,
}

impl SlackWebhookChannel {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl ChatChannel for SlackWebhookChannel {
    async fn post(&self, text: &str) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "text": text }))
            .send()
            .await?;
        ensure_accepted(response).await
    }
}

async fn ensure_accepted(response: reqwest::Response) -> Result<(), NotificationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(NotificationError::Rejected {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_payload_carries_both_parts() {
        let channel = HttpEmailChannel::new(
            reqwest::Client::new(),
            "http://localhost/send".to_string(),
            None,
            "migrations@example.com".to_string(),
        );
        let message = RenderedNotification {
            subject: "Publisher migration started (live)".to_string(),
            html: "<h2>started</h2>".to_string(),
            text: "started".to_string(),
            chat: "started".to_string(),
        };

        let payload = channel.payload(&["ops@example.com".to_string()], &message);
        assert_eq!(payload["to"][0], "ops@example.com");
        assert_eq!(payload["content"][0]["type"], "text/plain");
        assert_eq!(payload["content"][1]["type"], "text/html");
        assert_eq!(payload["content"][1]["value"], "<h2>started</h2>");
    }
}
