use std::future::Future;
use std::sync::Arc;

use crate::api::{HttpListingSource, ListingSource};
use crate::core::{Config, HealthChecker, Result};
use crate::monitoring::{
    BaselineCache, PipelineSettings, PricePipeline, PriceReporter, PriceStore, PriceSummary,
    SchedulerReport, TickScheduler,
};
use crate::notify::{build_notifier, Notifier};

/// Owns every long-lived handle of the running service.
pub struct PriceService {
    config: Config,
    store: Arc<PriceStore>,
    cache: Arc<BaselineCache>,
    notifier: Arc<dyn Notifier>,
    pipeline: Arc<PricePipeline>,
    health: HealthChecker,
}

impl PriceService {
    pub async fn start(config: Config, health: HealthChecker) -> Result<Self> {
        let source = Arc::new(HttpListingSource::new(
            &config.source.api_url,
            config.source.fetch_timeout(),
        )?);
        let notifier = build_notifier(&config.mailjet)?;

        Self::assemble(config, source, notifier, health).await
    }

    /// Opens the store, seeds the baseline cache and wires the pipeline
    /// around the given collaborators.
    pub async fn assemble(
        config: Config,
        source: Arc<dyn ListingSource>,
        notifier: Arc<dyn Notifier>,
        health: HealthChecker,
    ) -> Result<Self> {
        tracing::info!("🏠 Pricing service starting...");

        let store = match PriceStore::open(&config.database.path).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::error!("❌ Cannot open price store at {}: {}", config.database.path, e);
                notifier.close().await;
                return Err(e);
            }
        };
        health.update_component("store", true).await;
        health.update_component("notifier", true).await;

        let cache = Arc::new(BaselineCache::new());
        let seeded = match Self::reseed(&store, &cache).await {
            Ok(seeded) => seeded,
            Err(e) => {
                tracing::error!("❌ Cannot read known listings: {}", e);
                notifier.close().await;
                store.close().await;
                return Err(e);
            }
        };
        tracing::info!("✅ Baseline cache seeded with {} known listings", seeded);

        let settings = PipelineSettings {
            fetch_timeout: config.source.fetch_timeout(),
            notify_timeout: config.mailjet.timeout(),
            baseline_policy: config.scheduler.baseline_policy,
        };
        let pipeline = Arc::new(
            PricePipeline::new(source, store.clone(), cache.clone(), notifier.clone(), settings)
                .with_health(health.clone()),
        );

        Ok(Self {
            config,
            store,
            cache,
            notifier,
            pipeline,
            health,
        })
    }

    /// Rebuilds cache presence from the store. Prices are not loaded.
    pub async fn reseed(store: &PriceStore, cache: &BaselineCache) -> Result<usize> {
        let ids = store.list_known_ids().await?;
        Ok(cache.seed(ids).await)
    }

    pub fn pipeline(&self) -> &Arc<PricePipeline> {
        &self.pipeline
    }

    pub fn store(&self) -> &Arc<PriceStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<BaselineCache> {
        &self.cache
    }

    pub fn health(&self) -> &HealthChecker {
        &self.health
    }

    pub async fn run<F>(&self, shutdown: F) -> SchedulerReport
    where
        F: Future<Output = ()>,
    {
        let scheduler = TickScheduler::new(
            self.pipeline.clone(),
            self.config.scheduler.poll_interval(),
            self.config.scheduler.max_in_flight_ticks,
        );
        scheduler.run(shutdown).await
    }

    /// Final dump of the store, then releases the notifier and store handles.
    pub async fn shutdown(&self) -> Result<PriceSummary> {
        let reporter = PriceReporter::new(self.store.clone());
        let dumped = reporter.dump_report().await;
        let summary = reporter.generate_summary().await;

        match &dumped {
            Ok(report) => tracing::info!("{}", report),
            Err(e) => tracing::warn!("⚠️  Final store dump failed: {}", e),
        }

        self.notifier.close().await;
        self.store.close().await;
        tracing::info!("👋 Pricing service stopped");

        summary
    }
}
