use metrics::histogram;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// Client for the outbound mail relay.
///
/// The relay accepts a JSON envelope and handles templating and provider
/// routing itself. When no relay URL is configured the mailer runs in
/// disabled mode and only logs, which keeps development and test setups
/// free of network dependencies.
#[derive(Clone)]
pub struct Mailer {
    http: Client,
    relay_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct MailEnvelope<'a> {
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

impl Mailer {
    pub fn new(relay_url: Option<String>) -> Self {
        Self {
            http: Client::new(),
            relay_url,
        }
    }

    /// Delivers one message through the relay.
    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailerError> {
        let Some(relay_url) = self.relay_url.as_deref() else {
            info!(stage = "mail", %to, %subject, "mail relay disabled, dropping message");
            return Ok(());
        };

        let start = std::time::Instant::now();
        let response = self
            .http
            .post(relay_url)
            .json(&MailEnvelope { to, subject, body })
            .send()
            .await?;
        histogram!("mail_send_seconds").record(start.elapsed().as_secs_f64());

        let status = response.status();
        if !status.is_success() {
            return Err(MailerError::Status(status));
        }

        info!(stage = "mail", %to, %subject, "mail handed to relay");
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("failed to reach mail relay: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("mail relay rejected the message with status {0}")]
    Status(StatusCode),
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn posts_envelope_to_relay() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/mail")
                    .json_body_obj(&serde_json::json!({
                        "to": "user@example.com",
                        "subject": "Verify your email",
                        "body": "hello",
                    }));
                then.status(202);
            })
            .await;

        let mailer = Mailer::new(Some(server.url("/mail")));
        mailer
            .send("user@example.com", "Verify your email", "hello")
            .await
            .expect("relay accepts");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn relay_error_status_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/mail");
                then.status(500);
            })
            .await;

        let mailer = Mailer::new(Some(server.url("/mail")));
        let err = mailer
            .send("user@example.com", "subject", "body")
            .await
            .expect_err("relay rejected");
        assert!(matches!(err, MailerError::Status(status) if status.as_u16() == 500));
    }

    #[tokio::test]
    async fn disabled_mailer_succeeds_without_network() {
        let mailer = Mailer::new(None);
        mailer
            .send("user@example.com", "subject", "body")
            .await
            .expect("disabled mode is a no-op");
    }
}
