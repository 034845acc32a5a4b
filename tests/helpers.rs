#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use property_price_watcher::api::{FetchedRow, ListingBatch, ListingSource, ListingType};
use property_price_watcher::core::config::{
    Config, DatabaseConfig, MailjetConfig, MonitoringConfig, SchedulerConfig, SourceConfig,
};
use property_price_watcher::core::{PriceWatchError, Result};
use property_price_watcher::monitoring::{
    BaselineCache, BaselinePolicy, PipelineSettings, PricePipeline, PriceStore,
};
use property_price_watcher::notify::{Notifier, PriceAlert};

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn home(id: &str, price: f64, base: f64) -> FetchedRow {
    FetchedRow::new(id, ListingType::Home, price, base)
}

pub fn apartment(id: &str, price: f64, base: f64) -> FetchedRow {
    FetchedRow::new(id, ListingType::Apartment, price, base)
}

/// Hands out one scripted response per fetch; repeats the last one when exhausted.
pub struct ScriptedSource {
    responses: Mutex<VecDeque<Result<ListingBatch>>>,
    last: Mutex<Option<Result<ListingBatch>>>,
    delay: Duration,
}

impl ScriptedSource {
    pub fn new(responses: Vec<Result<ListingBatch>>) -> Arc<Self> {
        Self::delayed(responses, Duration::ZERO)
    }

    pub fn rows(rows: Vec<FetchedRow>) -> Arc<Self> {
        Self::new(vec![Ok(ListingBatch::new(rows))])
    }

    pub fn ticks(ticks: Vec<Vec<FetchedRow>>) -> Arc<Self> {
        Self::new(ticks.into_iter().map(|rows| Ok(ListingBatch::new(rows))).collect())
    }

    pub fn delayed(responses: Vec<Result<ListingBatch>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            last: Mutex::new(None),
            delay,
        })
    }
}

#[async_trait]
impl ListingSource for ScriptedSource {
    async fn fetch(&self) -> Result<ListingBatch> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self.responses.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(response) => {
                *last = Some(response.clone());
                response
            }
            None => last
                .clone()
                .unwrap_or_else(|| Ok(ListingBatch::default())),
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<PriceAlert>>,
    fail: bool,
    delay: Duration,
    closed: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Default::default()
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Default::default()
        })
    }

    pub fn alerts(&self) -> Vec<PriceAlert> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn alerts_for(&self, id: &str) -> Vec<PriceAlert> {
        self.alerts().into_iter().filter(|a| a.id == id).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, alert: &PriceAlert) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.alerts.lock().unwrap().push(alert.clone());
        if self.fail {
            return Err(PriceWatchError::NotifyFailed("smtp relay down".to_string()));
        }
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub store: Arc<PriceStore>,
    pub cache: Arc<BaselineCache>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_notifier(RecordingNotifier::new()).await
    }

    pub async fn with_notifier(notifier: Arc<RecordingNotifier>) -> Self {
        Self {
            store: Arc::new(PriceStore::open(":memory:").await.unwrap()),
            cache: Arc::new(BaselineCache::new()),
            notifier,
        }
    }

    /// A pipeline sharing this harness' store, cache and notifier.
    pub fn pipeline(&self, source: Arc<dyn ListingSource>, policy: BaselinePolicy) -> PricePipeline {
        self.pipeline_with(
            source,
            PipelineSettings {
                baseline_policy: policy,
                ..Default::default()
            },
        )
    }

    pub fn pipeline_with(&self, source: Arc<dyn ListingSource>, settings: PipelineSettings) -> PricePipeline {
        PricePipeline::new(
            source,
            self.store.clone(),
            self.cache.clone(),
            self.notifier.clone(),
            settings,
        )
    }

    pub async fn stored_price(&self, id: &str) -> Option<f64> {
        self.store
            .get(id)
            .await
            .unwrap()
            .map(|record| record.dynamic_display_price)
    }
}

/// Spawns every tick so they genuinely interleave, then collects their reports in order.
pub async fn spawn_all<F>(ticks: Vec<F>) -> Vec<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    let handles: Vec<_> = ticks.into_iter().map(tokio::spawn).collect();
    let mut outputs = Vec::with_capacity(handles.len());
    for handle in handles {
        outputs.push(handle.await.unwrap());
    }
    outputs
}

pub fn test_config(db_path: &str) -> Config {
    Config {
        source: SourceConfig {
            api_url: "http://127.0.0.1:9/prices".to_string(),
            fetch_timeout_secs: 5,
        },
        database: DatabaseConfig {
            path: db_path.to_string(),
        },
        scheduler: SchedulerConfig {
            poll_interval_secs: 60,
            max_in_flight_ticks: 1,
            baseline_policy: BaselinePolicy::Observed,
        },
        mailjet: MailjetConfig::default(),
        monitoring: MonitoringConfig {
            log_level: "debug".to_string(),
            health_port: None,
        },
    }
}
