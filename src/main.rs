use anyhow::{Context, Result};
use property_price_watcher::core::{self, Config, HealthChecker};
use property_price_watcher::PriceService;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    core::logging::init_logging(&config.monitoring.log_level);

    tracing::info!("🚀 Property price watcher starting...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Polling {} every {}s", config.source.api_url, config.scheduler.poll_interval_secs);
    tracing::info!("Baseline policy: {}", config.scheduler.baseline_policy);

    let health_checker = HealthChecker::new();

    if let Some(port) = config.monitoring.health_port {
        let health_clone = health_checker.clone();
        tokio::spawn(async move { start_health_server(health_clone, port).await });
        tracing::info!("✅ Health endpoint running on port {}", port);
    }

    let service = match PriceService::start(config, health_checker).await {
        Ok(service) => service,
        Err(e) => {
            tracing::error!(error_kind = e.kind(), "❌ Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    let report = service
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::warn!("Service interrupted");
        })
        .await;

    tracing::info!("Ticks fired: {}, skipped: {}", report.fired, report.skipped);

    service.shutdown().await.context("Shutdown dump failed")?;

    Ok(())
}

async fn start_health_server(health_checker: HealthChecker, port: u16) {
    use warp::Filter;

    let health = warp::path("health")
        .and(warp::any().map(move || health_checker.clone()))
        .and_then(|checker: HealthChecker| async move {
            let status = checker.get_status().await;
            Ok::<_, warp::Rejection>(warp::reply::json(&status))
        });

    warp::serve(health).run(([0, 0, 0, 0], port)).await;
}
