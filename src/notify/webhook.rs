//! Webhook notification channel

use crate::core::secrets::SecretResolver;
use crate::notify::{NotificationChannel, NotificationPayload, NotifyError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// POSTs the payload as JSON, authenticating with a bearer token read
/// from a named secret
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
    token_secret: Option<String>,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>, token_secret: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            token_secret,
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(
        &self,
        payload: &NotificationPayload,
        secrets: &dyn SecretResolver,
    ) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.url).json(payload);

        if let Some(secret_name) = &self.token_secret {
            let token = secrets
                .resolve(secret_name)
                .ok_or_else(|| NotifyError::MissingSecret(secret_name.clone()))?;
            request = request.bearer_auth(token.expose());
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.without_url().to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }

        debug!("Webhook accepted notification for run {}", payload.run_id);
        Ok(())
    }
}
