//! SQLite-backed storage for the kelasi offline grade queue.

pub mod grade_queue;

pub use grade_queue::SqliteQueueStore;
