//! Storage backends for the collaboration graph

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{OpenStore, Store, StoreError, StoreResult};
