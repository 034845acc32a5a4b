pub mod mailjet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::ListingType;
use crate::core::config::MailjetConfig;
use crate::core::Result;

pub use mailjet::MailjetNotifier;

/// A threshold crossing for one listing, ready to be rendered and delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAlert {
    pub category: ListingType,
    pub id: String,
    /// Absent when the baseline was seeded by presence only.
    pub old_price: Option<f64>,
    pub new_price: f64,
    pub base_price: f64,
}

impl PriceAlert {
    pub fn render(&self) -> String {
        let old = self
            .old_price
            .map(|p| p.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let direction = match self.category {
            ListingType::Home => "above",
            ListingType::Apartment => "below",
        };

        format!(
            "The price of {} {} has changed from {} to {}, {} the base price {}.\nunsubscribe\n",
            self.category, self.id, old, self.new_price, direction, self.base_price
        )
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &PriceAlert) -> Result<()>;

    async fn close(&self) {}
}

/// Used when no delivery credentials are configured: alerts are logged, never sent.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, alert: &PriceAlert) -> Result<()> {
        tracing::info!(
            listing_id = %alert.id,
            category = %alert.category,
            "📭 Alert not sent (no notification credentials): {}",
            alert.render().trim_end()
        );
        Ok(())
    }
}

pub fn build_notifier(config: &MailjetConfig) -> Result<Arc<dyn Notifier>> {
    if config.has_credentials() {
        tracing::info!("📧 Mailjet notifier enabled for {}", config.to_email);
        Ok(Arc::new(MailjetNotifier::new(config.clone())?))
    } else {
        tracing::warn!("⚠️  Mailjet credentials missing, alerts will only be logged");
        Ok(Arc::new(LogNotifier))
    }
}
