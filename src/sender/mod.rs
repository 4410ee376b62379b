pub mod series;
pub mod store;

pub use series::{CancellationToken, SeriesOrchestrator};
pub use store::{store, store_file};
