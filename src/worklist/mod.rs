pub mod item;
pub mod persist;
pub mod query;

pub use item::WorklistItem;
pub use persist::{list_records, ResultPersister, WorklistRecord};
pub use query::{find, FindAnomaly, FindOutcome, WorklistQuery};
