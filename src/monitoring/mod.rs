pub mod baseline;
pub mod database;
pub mod pipeline;
pub mod reporter;
pub mod scheduler;

pub use baseline::{BaselineCache, BaselineGuard, BaselinePolicy};
pub use database::{PriceRecord, PriceStore, UpdateOutcome};
pub use pipeline::{AlertOutcome, Persistence, PipelineSettings, PricePipeline, RowOutcome, TickReport};
pub use reporter::{PriceReporter, PriceSummary};
pub use scheduler::{SchedulerReport, TickRunner, TickScheduler};
