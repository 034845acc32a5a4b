pub mod listings;
pub mod types;

pub use listings::{HttpListingSource, ListingSource};
pub use types::*;
