pub mod api;
pub mod core;
pub mod monitoring;
pub mod notify;
pub mod service;

pub use service::PriceService;
