use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::monitoring::TickReport;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: ComponentHealth,
    pub last_tick: Option<TickReport>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub store: bool,
    pub data_source: bool,
    pub notifier: bool,
    #[serde(flatten)]
    pub extra: HashMap<String, bool>,
}

#[derive(Clone)]
pub struct HealthChecker {
    start_time: std::time::Instant,
    status: Arc<RwLock<ComponentHealth>>,
    last_tick: Arc<RwLock<Option<TickReport>>>,
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            start_time: std::time::Instant::now(),
            status: Arc::new(RwLock::new(ComponentHealth::default())),
            last_tick: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn get_status(&self) -> HealthStatus {
        let components = self.status.read().await.clone();

        HealthStatus {
            status: if components.store && components.data_source {
                "healthy".to_string()
            } else {
                "degraded".to_string()
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            components,
            last_tick: self.last_tick.read().await.clone(),
        }
    }

    pub async fn update_component(&self, component: &str, healthy: bool) {
        let mut status = self.status.write().await;
        match component {
            "store" => status.store = healthy,
            "data_source" => status.data_source = healthy,
            "notifier" => status.notifier = healthy,
            _ => {
                status.extra.insert(component.to_string(), healthy);
            }
        }
    }

    /// Folds a finished tick into component health.
    pub async fn record_tick(&self, report: &TickReport) {
        self.update_component("data_source", !report.skipped).await;
        if !report.skipped {
            self.update_component("store", report.storage_failures == 0).await;
            if report.alerts_attempted() > 0 {
                self.update_component("notifier", report.notify_failures == 0).await;
            }
        }
        *self.last_tick.write().await = Some(report.clone());
    }
}
