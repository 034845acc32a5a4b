use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{Notifier, PriceAlert};
use crate::core::config::MailjetConfig;
use crate::core::{PriceWatchError, Result};

const MAILJET_SEND_URL: &str = "https://api.mailjet.com/v3.1/send";

pub struct MailjetNotifier {
    client: Client,
    config: MailjetConfig,
    endpoint: String,
}

impl MailjetNotifier {
    pub fn new(config: MailjetConfig) -> Result<Self> {
        Self::with_endpoint(config, MAILJET_SEND_URL)
    }

    pub fn with_endpoint(config: MailjetConfig, endpoint: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| PriceWatchError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn build_message(&self, text: &str) -> Value {
        json!({
            "Messages": [{
                "From": {
                    "Email": self.config.from_email,
                    "Name": self.config.name,
                },
                "To": [{
                    "Email": self.config.to_email,
                    "Name": self.config.name,
                }],
                "Subject": self.config.subject,
                "TextPart": text,
                "CustomID": self.config.custom_id,
            }]
        })
    }
}

#[async_trait]
impl Notifier for MailjetNotifier {
    async fn notify(&self, alert: &PriceAlert) -> Result<()> {
        let text = alert.render();
        tracing::info!(listing_id = %alert.id, "🔔 {}", text.trim_end());

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
            .json(&self.build_message(&text))
            .send()
            .await
            .map_err(|e| PriceWatchError::NotifyFailed(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(PriceWatchError::NotifyFailed(format!(
                "Mailjet rejected message: {} - {}",
                status, body
            )));
        }

        tracing::info!(listing_id = %alert.id, "✅ Mailjet accepted alert: {}", body);
        Ok(())
    }

    async fn close(&self) {
        tracing::debug!("Mailjet notifier closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ListingType;

    fn config() -> MailjetConfig {
        MailjetConfig {
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            from_email: "alerts@example.com".to_string(),
            to_email: "owner@example.com".to_string(),
            name: "Price Watch".to_string(),
            subject: "Price Alert!".to_string(),
            custom_id: "PriceServiceApp".to_string(),
            timeout_secs: 2,
        }
    }

    #[test]
    fn test_message_payload() {
        let notifier = MailjetNotifier::new(config()).unwrap();
        let message = notifier.build_message("hello");

        let first = &message["Messages"][0];
        assert_eq!(first["From"]["Email"], "alerts@example.com");
        assert_eq!(first["To"][0]["Email"], "owner@example.com");
        assert_eq!(first["Subject"], "Price Alert!");
        assert_eq!(first["TextPart"], "hello");
        assert_eq!(first["CustomID"], "PriceServiceApp");
    }

    #[tokio::test]
    async fn test_unreachable_mailjet_is_notify_failed() {
        let notifier = MailjetNotifier::with_endpoint(config(), "http://127.0.0.1:9/send").unwrap();
        let alert = PriceAlert {
            category: ListingType::Home,
            id: "A1".to_string(),
            old_price: Some(90.0),
            new_price: 110.0,
            base_price: 100.0,
        };

        let err = notifier.notify(&alert).await.unwrap_err();
        assert!(matches!(err, PriceWatchError::NotifyFailed(_)));
    }
}
