use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::{PriceWatchError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingType {
    Home,
    Apartment,
}

impl ListingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingType::Home => "home",
            ListingType::Apartment => "apartment",
        }
    }
}

impl fmt::Display for ListingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "home" => Ok(ListingType::Home),
            "apartment" => Ok(ListingType::Apartment),
            other => Err(format!("unknown listing type '{}'", other)),
        }
    }
}

/// One listing as reported by the data source for the current tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedRow {
    pub id: String,
    #[serde(rename = "type")]
    pub listing_type: ListingType,
    pub dynamic_display_price: f64,
    pub base_price: f64,
}

impl FetchedRow {
    pub fn new(id: &str, listing_type: ListingType, dynamic_display_price: f64, base_price: f64) -> Self {
        Self {
            id: id.to_string(),
            listing_type,
            dynamic_display_price,
            base_price,
        }
    }

    /// Homes alert above their base price, apartments below it. Equality never alerts.
    pub fn is_alert_eligible(&self) -> bool {
        match self.listing_type {
            ListingType::Home => self.dynamic_display_price > self.base_price,
            ListingType::Apartment => self.dynamic_display_price < self.base_price,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("empty id".to_string());
        }
        for (field, value) in [
            ("dynamicDisplayPrice", self.dynamic_display_price),
            ("basePrice", self.base_price),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} is not a valid price: {}", field, value));
            }
        }
        Ok(())
    }
}

/// Wire envelope returned by the listings endpoint. Rows are decoded one by one
/// so that a single bad row cannot poison the batch.
#[derive(Debug, Deserialize)]
pub struct PropertiesEnvelope {
    pub properties: Vec<serde_json::Value>,
}

/// Rows accepted for this tick plus the number dropped as malformed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingBatch {
    pub rows: Vec<FetchedRow>,
    pub malformed: usize,
}

impl ListingBatch {
    pub fn new(rows: Vec<FetchedRow>) -> Self {
        Self { rows, malformed: 0 }
    }

    pub fn from_envelope(envelope: PropertiesEnvelope) -> Self {
        let mut batch = ListingBatch::default();

        for (index, raw) in envelope.properties.into_iter().enumerate() {
            let decoded = serde_json::from_value::<FetchedRow>(raw)
                .map_err(|e| e.to_string())
                .and_then(|row| row.validate().map(|_| row));

            match decoded {
                Ok(row) => batch.rows.push(row),
                Err(reason) => {
                    tracing::warn!("⚠️  Dropping malformed listing row #{}: {}", index, reason);
                    batch.malformed += 1;
                }
            }
        }

        batch
    }

    pub fn from_json(body: &str) -> Result<Self> {
        let envelope: PropertiesEnvelope = serde_json::from_str(body)
            .map_err(|e| PriceWatchError::FetchUnavailable(format!("invalid payload: {}", e)))?;
        Ok(Self::from_envelope(envelope))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
