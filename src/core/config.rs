use anyhow::{bail, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::monitoring::BaselinePolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub mailjet: MailjetConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub api_url: String,
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub poll_interval_secs: u64,
    pub max_in_flight_ticks: usize,
    pub baseline_policy: BaselinePolicy,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MailjetConfig {
    pub api_key: String,
    pub api_secret: String,
    pub from_email: String,
    pub to_email: String,
    pub name: String,
    pub subject: String,
    pub custom_id: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub health_port: Option<u16>,
}

impl SourceConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl MailjetConfig {
    /// Both halves of the credential pair must be present before anything is sent.
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let config = Config {
            source: SourceConfig {
                api_url: env_or("PRICE_WATCH_API_URL", ""),
                fetch_timeout_secs: env_parse("PRICE_WATCH_FETCH_TIMEOUT_SECS", 10),
            },
            database: DatabaseConfig {
                path: env_or("PRICE_WATCH_DB_PATH", "prices.db"),
            },
            scheduler: SchedulerConfig {
                poll_interval_secs: env_parse("PRICE_WATCH_POLL_INTERVAL_SECS", 5),
                max_in_flight_ticks: env_parse("PRICE_WATCH_MAX_IN_FLIGHT_TICKS", 1),
                baseline_policy: env_parse("PRICE_WATCH_BASELINE_POLICY", BaselinePolicy::Observed),
            },
            mailjet: MailjetConfig {
                api_key: env_or("MAILJET_API_KEY", ""),
                api_secret: env_or("MAILJET_API_SECRET", ""),
                from_email: env_or("MAILJET_FROM_EMAIL", ""),
                to_email: env_or("MAILJET_TO_EMAIL", ""),
                name: env_or("MAILJET_NAME", ""),
                subject: env_or("MAILJET_SUBJECT", "Price Alert!"),
                custom_id: env_or("MAILJET_CUSTOM_ID", "PriceServiceApp"),
                timeout_secs: env_parse("PRICE_WATCH_NOTIFY_TIMEOUT_SECS", 10),
            },
            monitoring: MonitoringConfig {
                log_level: env_or("LOG_LEVEL", "info"),
                health_port: env::var("HEALTH_PORT").ok().and_then(|p| p.parse().ok()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.api_url.trim().is_empty() {
            bail!("PRICE_WATCH_API_URL must be set");
        }
        if self.scheduler.poll_interval_secs == 0 {
            bail!("PRICE_WATCH_POLL_INTERVAL_SECS must be greater than zero");
        }
        if self.scheduler.max_in_flight_ticks == 0 {
            bail!("PRICE_WATCH_MAX_IN_FLIGHT_TICKS must be at least 1");
        }
        Ok(())
    }
}
