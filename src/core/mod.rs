pub mod config;
pub mod error;
pub mod health;
pub mod logging;

pub use config::Config;
pub use error::{PriceWatchError, Result};
pub use health::{HealthChecker, HealthStatus};
