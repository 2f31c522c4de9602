//! Storage contract for the offline grade queue, plus the in-memory store.

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

use super::{GradePayload, MutationKind, QueueItem, QueueStatus};
use crate::errors::{QueueError, Result};

/// Persistence contract for queued grade mutations.
///
/// Every operation must be atomic on its own; the sync engine layers no
/// transaction on top. Status mutators are idempotent and treat unknown
/// ids as a no-op, so a pass can finish even when a resolution removed an
/// item underneath it.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Persist a new pending mutation and return its queue id.
    ///
    /// When a pending or errored item already targets the same grade cell,
    /// the new payload replaces it in place (status back to pending, error
    /// message cleared) and the existing id is returned. Items currently in
    /// flight are left untouched and a fresh item is stored instead.
    async fn enqueue(&self, kind: MutationKind, payload: GradePayload) -> Result<String>;

    /// Fetch one item by id.
    async fn get(&self, id: &str) -> Result<Option<QueueItem>>;

    /// All pending items, in storage order.
    async fn list_pending(&self) -> Result<Vec<QueueItem>>;

    /// All errored items, in storage order.
    async fn list_errors(&self) -> Result<Vec<QueueItem>>;

    /// Number of pending items.
    async fn pending_count(&self) -> Result<usize>;

    /// Mark an item as in flight.
    async fn mark_syncing(&self, id: &str) -> Result<()>;

    /// Return an item to pending and clear its error message.
    async fn mark_pending(&self, id: &str) -> Result<()>;

    /// Mark an item failed and record the reason.
    async fn mark_error(&self, id: &str, message: &str) -> Result<()>;

    /// Delete an item.
    async fn remove(&self, id: &str) -> Result<()>;

    /// Reset every errored item to pending, clearing messages.
    /// Returns how many items were reset.
    async fn retry_errors(&self) -> Result<usize>;
}

/// In-memory queue store.
///
/// The default store for tests, also usable where durability is not needed
/// (the grade queue of a kiosk session, for instance).
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    items: Mutex<Vec<QueueItem>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<QueueItem>>> {
        self.items
            .lock()
            .map_err(|_| QueueError::storage("Queue store lock is poisoned"))
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn enqueue(&self, kind: MutationKind, payload: GradePayload) -> Result<String> {
        let mut items = self.lock()?;
        if let Some(existing) = items.iter_mut().find(|item| {
            item.status != QueueStatus::Syncing && item.payload.grade_key() == payload.grade_key()
        }) {
            existing.payload = payload;
            existing.status = QueueStatus::Pending;
            existing.error_message = None;
            return Ok(existing.id.clone());
        }

        let item = QueueItem::new(kind, payload);
        let id = item.id.clone();
        items.push(item);
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<QueueItem>> {
        Ok(self.lock()?.iter().find(|item| item.id == id).cloned())
    }

    async fn list_pending(&self) -> Result<Vec<QueueItem>> {
        Ok(self
            .lock()?
            .iter()
            .filter(|item| item.status == QueueStatus::Pending)
            .cloned()
            .collect())
    }

    async fn list_errors(&self) -> Result<Vec<QueueItem>> {
        Ok(self
            .lock()?
            .iter()
            .filter(|item| item.status == QueueStatus::Error)
            .cloned()
            .collect())
    }

    async fn pending_count(&self) -> Result<usize> {
        Ok(self
            .lock()?
            .iter()
            .filter(|item| item.status == QueueStatus::Pending)
            .count())
    }

    async fn mark_syncing(&self, id: &str) -> Result<()> {
        let mut items = self.lock()?;
        if let Some(item) = items.iter_mut().find(|item| item.id == id) {
            item.status = QueueStatus::Syncing;
            item.error_message = None;
        }
        Ok(())
    }

    async fn mark_pending(&self, id: &str) -> Result<()> {
        let mut items = self.lock()?;
        if let Some(item) = items.iter_mut().find(|item| item.id == id) {
            item.status = QueueStatus::Pending;
            item.error_message = None;
        }
        Ok(())
    }

    async fn mark_error(&self, id: &str, message: &str) -> Result<()> {
        let mut items = self.lock()?;
        if let Some(item) = items.iter_mut().find(|item| item.id == id) {
            item.status = QueueStatus::Error;
            item.error_message = Some(message.to_string());
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.lock()?.retain(|item| item.id != id);
        Ok(())
    }

    async fn retry_errors(&self) -> Result<usize> {
        let mut items = self.lock()?;
        let mut reset = 0usize;
        for item in items.iter_mut() {
            if item.status == QueueStatus::Error {
                item.status = QueueStatus::Pending;
                item.error_message = None;
                reset += 1;
            }
        }
        Ok(reset)
    }
}
