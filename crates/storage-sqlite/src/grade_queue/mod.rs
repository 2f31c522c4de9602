//! SQLite persistence for the offline grade queue.

mod repository;

pub use repository::SqliteQueueStore;
