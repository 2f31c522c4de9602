//! Offline grade synchronization: REST client, sync engine, auto-sync trigger.
//!
//! Grade mutations captured while offline sit in a [`kelasi_core::sync::QueueStore`]
//! until the [`SyncEngine`] drains them against the school API, one request per
//! item or one batch call for large backlogs. [`AutoSync`] wires the engine to a
//! connectivity watcher so reconnects drain the queue without user action.

mod auto_sync;
mod client;
mod engine;
mod error;
mod types;

pub use auto_sync::{AutoSync, SyncCallback};
pub use client::GradeApiClient;
pub use engine::SyncEngine;
pub use error::{GradeApiError, Result};
pub use types::{
    ApiErrorResponse, BatchGradeEntry, BatchGradeResult, BatchSyncRequest, BatchSyncResponse,
    ConflictResponse, ForceOverwriteRequest,
};

#[cfg(test)]
pub(crate) mod testutil;
