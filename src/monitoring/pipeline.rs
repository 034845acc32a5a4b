use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use uuid::Uuid;

use super::baseline::{BaselineCache, BaselineGuard, BaselinePolicy};
use super::database::{PriceRecord, PriceStore};
use super::scheduler::TickRunner;
use crate::api::{FetchedRow, ListingBatch, ListingSource};
use crate::core::{HealthChecker, PriceWatchError};
use crate::notify::{Notifier, PriceAlert};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub fetch_timeout: Duration,
    pub notify_timeout: Duration,
    pub baseline_policy: BaselinePolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            notify_timeout: Duration::from_secs(10),
            baseline_policy: BaselinePolicy::Observed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persistence {
    Inserted,
    Updated,
    /// Conditional update was a no-op (same price or stale timestamp).
    Unchanged,
    /// Store write failed; the row is retried on the next tick.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertOutcome {
    NotTriggered,
    Sent,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowOutcome {
    pub id: String,
    pub persistence: Persistence,
    pub alert: AlertOutcome,
    pub duplicate_key: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub skipped: bool,
    pub skip_reason: Option<String>,
    pub malformed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub storage_failures: usize,
    pub duplicate_keys: usize,
    pub alerts_sent: usize,
    pub notify_failures: usize,
    pub duration_ms: u64,
    pub rows: Vec<RowOutcome>,
}

impl TickReport {
    fn new(tick_id: Uuid, timestamp: DateTime<Utc>) -> Self {
        Self {
            tick_id,
            timestamp,
            skipped: false,
            skip_reason: None,
            malformed: 0,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            storage_failures: 0,
            duplicate_keys: 0,
            alerts_sent: 0,
            notify_failures: 0,
            duration_ms: 0,
            rows: Vec::new(),
        }
    }

    pub fn skipped(timestamp: DateTime<Utc>, reason: String) -> Self {
        let mut report = Self::new(Uuid::new_v4(), timestamp);
        report.skipped = true;
        report.skip_reason = Some(reason);
        report
    }

    fn record(&mut self, outcome: RowOutcome) {
        match outcome.persistence {
            Persistence::Inserted => self.inserted += 1,
            Persistence::Updated => self.updated += 1,
            Persistence::Unchanged => self.unchanged += 1,
            Persistence::Failed => self.storage_failures += 1,
        }
        match outcome.alert {
            AlertOutcome::Sent => self.alerts_sent += 1,
            AlertOutcome::Failed => self.notify_failures += 1,
            AlertOutcome::NotTriggered => {}
        }
        if outcome.duplicate_key {
            self.duplicate_keys += 1;
        }
        self.rows.push(outcome);
    }

    pub fn rows_processed(&self) -> usize {
        self.rows.len()
    }

    pub fn alerts_attempted(&self) -> usize {
        self.alerts_sent + self.notify_failures
    }

    pub fn outcome(&self, id: &str) -> Option<&RowOutcome> {
        self.rows.iter().rev().find(|row| row.id == id)
    }
}

/// One poll tick: fetch, classify each row against its baseline, alert, persist.
pub struct PricePipeline {
    source: Arc<dyn ListingSource>,
    store: Arc<PriceStore>,
    cache: Arc<BaselineCache>,
    notifier: Arc<dyn Notifier>,
    settings: PipelineSettings,
    health: Option<HealthChecker>,
}

impl PricePipeline {
    pub fn new(
        source: Arc<dyn ListingSource>,
        store: Arc<PriceStore>,
        cache: Arc<BaselineCache>,
        notifier: Arc<dyn Notifier>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source,
            store,
            cache,
            notifier,
            settings,
            health: None,
        }
    }

    pub fn with_health(mut self, health: HealthChecker) -> Self {
        self.health = Some(health);
        self
    }

    pub fn cache(&self) -> &Arc<BaselineCache> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<PriceStore> {
        &self.store
    }

    /// Runs a tick stamped with `timestamp`. Every row of the tick shares it.
    pub async fn run_tick_at(&self, timestamp: DateTime<Utc>) -> TickReport {
        let tick_id = Uuid::new_v4();
        let span = tracing::info_span!("tick", %tick_id, timestamp = %timestamp);

        let report = self.execute(tick_id, timestamp).instrument(span).await;

        if let Some(health) = &self.health {
            health.record_tick(&report).await;
        }

        report
    }

    async fn execute(&self, tick_id: Uuid, timestamp: DateTime<Utc>) -> TickReport {
        let started = Instant::now();
        tracing::debug!("Starting tick");

        let batch = match self.fetch().await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(error_kind = e.kind(), "⏭️  Skipping tick: {}", e);
                let mut report = TickReport::skipped(timestamp, e.to_string());
                report.tick_id = tick_id;
                report.duration_ms = started.elapsed().as_millis() as u64;
                return report;
            }
        };

        let mut report = TickReport::new(tick_id, timestamp);
        report.malformed = batch.malformed;

        for row in &batch.rows {
            let outcome = self.process_row(row, timestamp).await;
            report.record(outcome);
        }

        report.duration_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            "✅ Tick complete: {} rows ({} inserted, {} updated, {} unchanged, {} failed), {} alerts sent, {} alerts failed, {} malformed in {}ms",
            report.rows_processed(),
            report.inserted,
            report.updated,
            report.unchanged,
            report.storage_failures,
            report.alerts_sent,
            report.notify_failures,
            report.malformed,
            report.duration_ms
        );

        report
    }

    async fn fetch(&self) -> Result<ListingBatch, PriceWatchError> {
        match tokio::time::timeout(self.settings.fetch_timeout, self.source.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(PriceWatchError::FetchUnavailable(format!(
                "fetch timed out after {:?}",
                self.settings.fetch_timeout
            ))),
        }
    }

    async fn process_row(&self, row: &FetchedRow, timestamp: DateTime<Utc>) -> RowOutcome {
        let mut baseline = self.cache.lock(&row.id).await;
        let known = baseline.has();
        let changed = baseline.get() != Some(row.dynamic_display_price);
        // A newer tick already wrote this baseline; its price is not a change from ours.
        let stale = baseline.is_stale(timestamp);
        if stale && changed {
            tracing::debug!(listing_id = %row.id, "⏪ Stale observation, alert suppressed");
        }

        let alert = if known && changed && !stale && row.is_alert_eligible() {
            let alert = PriceAlert {
                category: row.listing_type,
                id: row.id.clone(),
                old_price: baseline.get(),
                new_price: row.dynamic_display_price,
                base_price: row.base_price,
            };
            self.send_alert(&alert).await
        } else {
            AlertOutcome::NotTriggered
        };

        let mut duplicate_key = false;
        let persistence = if known {
            self.apply_update(&mut baseline, row, timestamp).await
        } else {
            match self.store.insert(&PriceRecord::from_row(row, timestamp)).await {
                Ok(()) => {
                    baseline.observe(row.dynamic_display_price, timestamp);
                    tracing::debug!(listing_id = %row.id, "🆕 Inserted {} at {}", row.listing_type, row.dynamic_display_price);
                    Persistence::Inserted
                }
                Err(PriceWatchError::DuplicateKey(id)) => {
                    tracing::warn!(
                        listing_id = %id,
                        "⚠️  Listing already persisted but missing from baseline cache, updating instead"
                    );
                    duplicate_key = true;
                    baseline.mark_known();
                    self.apply_update(&mut baseline, row, timestamp).await
                }
                Err(e) => {
                    tracing::warn!(listing_id = %row.id, error_kind = e.kind(), "⚠️  Insert failed: {}", e);
                    Persistence::Failed
                }
            }
        };

        self.cache.release(baseline).await;

        RowOutcome {
            id: row.id.clone(),
            persistence,
            alert,
            duplicate_key,
        }
    }

    async fn apply_update(
        &self,
        baseline: &mut BaselineGuard,
        row: &FetchedRow,
        timestamp: DateTime<Utc>,
    ) -> Persistence {
        let price = row.dynamic_display_price;

        let outcome = match self.store.conditional_update(&row.id, price, timestamp).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(listing_id = %row.id, error_kind = e.kind(), "⚠️  Update failed: {}", e);
                return Persistence::Failed;
            }
        };

        match self.settings.baseline_policy {
            BaselinePolicy::Observed => {
                if baseline.get() != Some(price) {
                    baseline.observe(price, timestamp);
                }
            }
            BaselinePolicy::Durable => {
                if outcome.applied {
                    baseline.observe(price, timestamp);
                } else if !baseline.is_stale(timestamp) && baseline.get() != Some(price) {
                    self.resync(baseline).await;
                }
            }
        }

        if outcome.applied {
            tracing::debug!(listing_id = %row.id, "💾 Updated price to {}", price);
            Persistence::Updated
        } else {
            Persistence::Unchanged
        }
    }

    async fn resync(&self, baseline: &mut BaselineGuard) {
        match self.store.get(baseline.id()).await {
            Ok(Some(record)) => baseline.observe(record.dynamic_display_price, record.timestamp),
            Ok(None) => {
                tracing::warn!(listing_id = %baseline.id(), "⚠️  Known listing has no stored record");
            }
            Err(e) => {
                tracing::warn!(listing_id = %baseline.id(), "⚠️  Baseline resync failed: {}", e);
            }
        }
    }

    async fn send_alert(&self, alert: &PriceAlert) -> AlertOutcome {
        let sent = tokio::time::timeout(self.settings.notify_timeout, self.notifier.notify(alert)).await;

        match sent {
            Ok(Ok(())) => AlertOutcome::Sent,
            Ok(Err(e)) => {
                tracing::warn!(listing_id = %alert.id, error_kind = e.kind(), "📪 Alert delivery failed: {}", e);
                AlertOutcome::Failed
            }
            Err(_) => {
                tracing::warn!(
                    listing_id = %alert.id,
                    error_kind = "notify_failed",
                    "📪 Alert delivery timed out after {:?}",
                    self.settings.notify_timeout
                );
                AlertOutcome::Failed
            }
        }
    }
}

#[async_trait]
impl TickRunner for PricePipeline {
    async fn run_tick(&self) -> TickReport {
        self.run_tick_at(Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::listings::MockListingSource;
    use crate::api::ListingType;
    use crate::notify::MockNotifier;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn source_returning(rows: Vec<FetchedRow>) -> MockListingSource {
        let mut source = MockListingSource::new();
        source
            .expect_fetch()
            .returning(move || Ok(ListingBatch::new(rows.clone())));
        source
    }

    async fn pipeline(source: MockListingSource, notifier: MockNotifier) -> PricePipeline {
        let store = Arc::new(PriceStore::open(":memory:").await.unwrap());
        PricePipeline::new(
            Arc::new(source),
            store,
            Arc::new(BaselineCache::new()),
            Arc::new(notifier),
            PipelineSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_first_observation_inserts_without_alert() {
        let source = source_returning(vec![FetchedRow::new("A1", ListingType::Home, 150.0, 100.0)]);
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().never();

        let pipeline = pipeline(source, notifier).await;
        let report = pipeline.run_tick_at(at(0)).await;

        assert_eq!(report.inserted, 1);
        assert_eq!(report.alerts_attempted(), 0);
        assert!(pipeline.cache().has("A1").await);
        assert_eq!(pipeline.cache().get("A1").await, Some(150.0));
    }

    #[tokio::test]
    async fn test_alert_carries_old_and_new_price() {
        let source = source_returning(vec![FetchedRow::new("A1", ListingType::Home, 110.0, 100.0)]);
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|alert| {
                alert.id == "A1"
                    && alert.category == ListingType::Home
                    && alert.old_price == Some(90.0)
                    && alert.new_price == 110.0
                    && alert.base_price == 100.0
            })
            .times(1)
            .returning(|_| Ok(()));

        let pipeline = pipeline(source, notifier).await;
        pipeline
            .store()
            .insert(&PriceRecord::from_row(
                &FetchedRow::new("A1", ListingType::Home, 90.0, 100.0),
                at(0),
            ))
            .await
            .unwrap();
        pipeline.cache().set("A1", 90.0).await;

        let report = pipeline.run_tick_at(at(5)).await;
        assert_eq!(report.alerts_sent, 1);
        assert_eq!(report.updated, 1);
    }

    #[tokio::test]
    async fn test_notify_failure_does_not_block_persistence() {
        let source = source_returning(vec![FetchedRow::new("B2", ListingType::Apartment, 150.0, 200.0)]);
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .times(1)
            .returning(|_| Err(PriceWatchError::NotifyFailed("mailbox full".to_string())));

        let pipeline = pipeline(source, notifier).await;
        pipeline
            .store()
            .insert(&PriceRecord::from_row(
                &FetchedRow::new("B2", ListingType::Apartment, 250.0, 200.0),
                at(0),
            ))
            .await
            .unwrap();
        pipeline.cache().set("B2", 250.0).await;

        let report = pipeline.run_tick_at(at(5)).await;
        assert_eq!(report.notify_failures, 1);
        assert_eq!(report.updated, 1);
        let stored = pipeline.store().get("B2").await.unwrap().unwrap();
        assert_eq!(stored.dynamic_display_price, 150.0);
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_tick() {
        let mut source = MockListingSource::new();
        source
            .expect_fetch()
            .returning(|| Err(PriceWatchError::FetchUnavailable("502".to_string())));
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().never();

        let pipeline = pipeline(source, notifier).await;
        let report = pipeline.run_tick_at(at(0)).await;

        assert!(report.skipped);
        assert_eq!(report.rows_processed(), 0);
        assert_eq!(pipeline.store().count().await.unwrap(), 0);
        assert!(pipeline.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_key_falls_back_to_update() {
        let source = source_returning(vec![FetchedRow::new("A1", ListingType::Home, 95.0, 100.0)]);
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().never();

        let pipeline = pipeline(source, notifier).await;
        // Persisted by an earlier process, but never seeded into this cache.
        pipeline
            .store()
            .insert(&PriceRecord::from_row(
                &FetchedRow::new("A1", ListingType::Home, 90.0, 100.0),
                at(0),
            ))
            .await
            .unwrap();

        let report = pipeline.run_tick_at(at(5)).await;
        assert_eq!(report.duplicate_keys, 1);
        assert_eq!(report.outcome("A1").unwrap().persistence, Persistence::Updated);
        assert_eq!(pipeline.cache().get("A1").await, Some(95.0));
    }
}
