use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;

use super::pipeline::TickReport;

/// Something the scheduler can fire once per interval.
#[async_trait]
pub trait TickRunner: Send + Sync {
    async fn run_tick(&self) -> TickReport;
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerReport {
    pub fired: usize,
    pub skipped: usize,
    pub completed: usize,
    pub crashed: usize,
}

/// Fires ticks at a fixed cadence without waiting for the previous one.
///
/// At most `max_in_flight` ticks run at once; a tick that finds every permit
/// taken is skipped, not queued. With a cap of one this means no overlap at
/// all. Above one, overlapping ticks rely on the per-listing locks in
/// [`BaselineCache`](super::BaselineCache).
pub struct TickScheduler {
    runner: Arc<dyn TickRunner>,
    interval: Duration,
    max_in_flight: usize,
    permits: Arc<Semaphore>,
}

impl TickScheduler {
    pub fn new(runner: Arc<dyn TickRunner>, interval: Duration, max_in_flight: usize) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            runner,
            interval,
            max_in_flight,
            permits: Arc::new(Semaphore::new(max_in_flight)),
        }
    }

    /// Runs until `shutdown` resolves, then waits for every in-flight tick.
    pub async fn run<F>(&self, shutdown: F) -> SchedulerReport
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            "⏱️  Scheduler started (every {:?}, max {} in flight)",
            self.interval,
            self.max_in_flight
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut in_flight: JoinSet<TickReport> = JoinSet::new();
        let mut report = SchedulerReport::default();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    tracing::info!("🛑 Shutdown requested, no further ticks will be armed");
                    break;
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    Self::reap(joined, &mut report);
                }
                _ = ticker.tick() => {
                    match self.permits.clone().try_acquire_owned() {
                        Ok(permit) => {
                            report.fired += 1;
                            let runner = self.runner.clone();
                            in_flight.spawn(async move {
                                let _permit = permit;
                                runner.run_tick().await
                            });
                        }
                        Err(_) => {
                            report.skipped += 1;
                            tracing::warn!(
                                "⏭️  {} tick(s) still running, skipping this tick",
                                in_flight.len()
                            );
                        }
                    }
                }
            }
        }

        if !in_flight.is_empty() {
            tracing::info!("⏳ Draining {} in-flight tick(s)", in_flight.len());
        }
        while let Some(joined) = in_flight.join_next().await {
            Self::reap(joined, &mut report);
        }

        tracing::info!(
            "Scheduler stopped: {} fired, {} skipped, {} completed, {} crashed",
            report.fired,
            report.skipped,
            report.completed,
            report.crashed
        );

        report
    }

    fn reap(joined: Result<TickReport, JoinError>, report: &mut SchedulerReport) {
        match joined {
            Ok(_) => report.completed += 1,
            Err(e) => {
                report.crashed += 1;
                tracing::error!("❌ Tick task failed: {}", e);
            }
        }
    }
}
