use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::types::ListingBatch;
use crate::core::{PriceWatchError, Result};

/// Source of listing rows for one tick.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn fetch(&self) -> Result<ListingBatch>;
}

pub struct HttpListingSource {
    client: Client,
    url: String,
}

impl HttpListingSource {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PriceWatchError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl ListingSource for HttpListingSource {
    async fn fetch(&self) -> Result<ListingBatch> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| PriceWatchError::FetchUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Listings API error: {} - {}", status, error_text);
            return Err(PriceWatchError::FetchUnavailable(format!(
                "API request failed: {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PriceWatchError::FetchUnavailable(e.to_string()))?;

        let batch = ListingBatch::from_json(&body)?;
        tracing::debug!(
            "📥 Fetched {} listings ({} malformed) from {}",
            batch.len(),
            batch.malformed,
            self.url
        );

        Ok(batch)
    }
}
