use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::database::{PriceRecord, PriceStore};
use crate::api::ListingType;
use crate::core::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSummary {
    pub total_listings: usize,
    pub homes: usize,
    pub apartments: usize,
    pub homes_above_base: usize,
    pub apartments_below_base: usize,
}

impl PriceSummary {
    pub fn from_records(records: &[PriceRecord]) -> Self {
        let mut summary = PriceSummary {
            total_listings: records.len(),
            ..Default::default()
        };

        for record in records {
            match record.listing_type {
                ListingType::Home => {
                    summary.homes += 1;
                    if record.dynamic_display_price > record.base_price {
                        summary.homes_above_base += 1;
                    }
                }
                ListingType::Apartment => {
                    summary.apartments += 1;
                    if record.dynamic_display_price < record.base_price {
                        summary.apartments_below_base += 1;
                    }
                }
            }
        }

        summary
    }
}

pub struct PriceReporter {
    store: Arc<PriceStore>,
}

impl PriceReporter {
    pub fn new(store: Arc<PriceStore>) -> Self {
        Self { store }
    }

    pub async fn generate_summary(&self) -> Result<PriceSummary> {
        let records = self.store.dump_all().await?;
        Ok(PriceSummary::from_records(&records))
    }

    /// Full diagnostic dump of the store.
    pub async fn dump_report(&self) -> Result<String> {
        let records = self.store.dump_all().await?;
        Ok(Self::format_records(&records))
    }

    pub fn format_records(records: &[PriceRecord]) -> String {
        let summary = PriceSummary::from_records(records);
        let mut report = String::new();

        report.push_str("\n╔══════════════════════════════════════════════════════════════════════╗\n");
        report.push_str("║             PRICE STORE DUMP                                        ║\n");
        report.push_str("╚══════════════════════════════════════════════════════════════════════╝\n\n");

        report.push_str(&format!(
            "📊 Listings: {} (🏠 Homes: {} | 🏢 Apartments: {})\n",
            summary.total_listings, summary.homes, summary.apartments
        ));
        report.push_str(&format!(
            "🔔 Alerting now: {} homes above base, {} apartments below base\n\n",
            summary.homes_above_base, summary.apartments_below_base
        ));

        if records.is_empty() {
            report.push_str("No prices recorded.\n");
            return report;
        }

        report.push_str("┌──────────────────────┬───────────┬──────────────┬──────────────┬─────────────────────┐\n");
        report.push_str("│ Id                   │ Type      │ Price        │ Base         │ Last Write (UTC)    │\n");
        report.push_str("├──────────────────────┼───────────┼──────────────┼──────────────┼─────────────────────┤\n");

        for record in records {
            report.push_str(&format!(
                "│ {:20} │ {:9} │ {:>12.2} │ {:>12.2} │ {} │\n",
                record.id,
                record.listing_type.as_str(),
                record.dynamic_display_price,
                record.base_price,
                record.timestamp.format("%Y-%m-%d %H:%M:%S")
            ));
        }

        report.push_str("└──────────────────────┴───────────┴──────────────┴──────────────┴─────────────────────┘\n");

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(id: &str, listing_type: ListingType, price: f64, base: f64) -> PriceRecord {
        PriceRecord {
            id: id.to_string(),
            listing_type,
            dynamic_display_price: price,
            base_price: base,
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn test_summary_counts() {
        let records = vec![
            record("A1", ListingType::Home, 110.0, 100.0),
            record("A2", ListingType::Home, 100.0, 100.0),
            record("B2", ListingType::Apartment, 150.0, 200.0),
        ];
        let summary = PriceSummary::from_records(&records);

        assert_eq!(summary.total_listings, 3);
        assert_eq!(summary.homes, 2);
        assert_eq!(summary.homes_above_base, 1);
        assert_eq!(summary.apartments_below_base, 1);
    }

    #[test]
    fn test_dump_lists_every_record() {
        let records = vec![
            record("A1", ListingType::Home, 110.0, 100.0),
            record("B2", ListingType::Apartment, 150.0, 200.0),
        ];
        let report = PriceReporter::format_records(&records);

        assert!(report.contains("A1"));
        assert!(report.contains("apartment"));
        assert!(report.contains("150.00"));
        assert!(report.contains("2023-11-14 22:13:20"));
    }

    #[tokio::test]
    async fn test_empty_store_dump() {
        let store = Arc::new(PriceStore::open(":memory:").await.unwrap());
        let reporter = PriceReporter::new(store);

        let report = reporter.dump_report().await.unwrap();
        assert!(report.contains("No prices recorded."));
        assert_eq!(reporter.generate_summary().await.unwrap(), PriceSummary::default());
    }
}
