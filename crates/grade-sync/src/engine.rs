//! Queue drain passes and conflict resolution against the grade API.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use kelasi_core::errors::QueueError;
use kelasi_core::sync::{
    conflict_message, ConflictItem, MutationKind, QueueItem, QueueStore, ResolveOutcome,
    ServerGrade, SyncReport, NETWORK_ERROR_FALLBACK,
};

use crate::client::GradeApiClient;
use crate::error::GradeApiError;
use crate::types::BatchGradeEntry;

/// Drains the offline queue against the grade API.
///
/// At most one pass runs at a time: the engine owns the gate, so two engines
/// over two stores never block each other. A caller arriving while a pass is
/// in flight receives an empty [`SyncReport`] and no item is touched.
///
/// Per-item failures never fail a pass; only storage errors propagate.
pub struct SyncEngine {
    store: Arc<dyn QueueStore>,
    client: GradeApiClient,
    pass_gate: Mutex<()>,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn QueueStore>, client: GradeApiClient) -> Self {
        Self {
            store,
            client,
            pass_gate: Mutex::new(()),
        }
    }

    /// The queue store this engine drains.
    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    /// Sync pending mutations one request at a time.
    ///
    /// Errored items are reset to pending first, so past failures are retried
    /// on every pass. Items that succeed leave the queue; conflicts and
    /// failures stay behind in error state.
    pub async fn sync_pending(&self) -> Result<SyncReport, QueueError> {
        let _guard = match self.pass_gate.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("[GradeSync] Sync already in flight; returning empty report");
                return Ok(SyncReport::default());
            }
        };

        self.store.retry_errors().await?;
        let pending = self.store.list_pending().await?;
        if pending.is_empty() {
            return Ok(SyncReport::default());
        }

        info!("[GradeSync] Syncing {} pending grades", pending.len());
        let mut report = SyncReport::default();

        for queued in &pending {
            let item = match self.claim(&queued.id).await? {
                Some(item) => item,
                None => continue,
            };
            let outcome = match item.kind {
                MutationKind::Create => self.client.create_grade(&item.payload).await,
                MutationKind::Update => self.client.update_grade(&item.payload).await,
            };
            match outcome {
                Ok(()) => {
                    self.store.remove(&item.id).await?;
                    report.synced += 1;
                }
                Err(GradeApiError::Conflict { server }) => {
                    self.record_conflict(&mut report, &item, server).await?;
                }
                Err(err) => {
                    let message = err.failure_text();
                    warn!("[GradeSync] Grade {} failed: {}", item.id, message);
                    self.store.mark_error(&item.id, &message).await?;
                    report.errors += 1;
                }
            }
        }

        info!(
            "[GradeSync] Pass complete synced={} errors={} conflicts={}",
            report.synced,
            report.errors,
            report.conflicts.len()
        );
        Ok(report)
    }

    /// Sync all pending mutations in a single batched request.
    ///
    /// Shares the in-flight gate and the error-reset priming with
    /// [`sync_pending`](Self::sync_pending). When the batch request itself
    /// fails, or the response omits a submitted item, that item goes back to
    /// pending so the next pass picks it up again; nothing is left in the
    /// syncing state once the pass returns.
    pub async fn sync_pending_batch(&self) -> Result<SyncReport, QueueError> {
        let _guard = match self.pass_gate.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("[GradeSync] Sync already in flight; returning empty report");
                return Ok(SyncReport::default());
            }
        };

        self.store.retry_errors().await?;
        let pending = self.store.list_pending().await?;
        if pending.is_empty() {
            return Ok(SyncReport::default());
        }

        info!("[GradeSync] Syncing {} pending grades as a batch", pending.len());
        let mut claimed = Vec::with_capacity(pending.len());
        for queued in &pending {
            if let Some(item) = self.claim(&queued.id).await? {
                claimed.push(item);
            }
        }
        if claimed.is_empty() {
            return Ok(SyncReport::default());
        }

        let entries: Vec<BatchGradeEntry> = claimed
            .iter()
            .map(|item| BatchGradeEntry {
                queue_id: item.id.clone(),
                payload: item.payload.clone(),
            })
            .collect();

        let response = match self.client.sync_batch(entries).await {
            Ok(response) => response,
            Err(err) => {
                // The whole request failed; no per-item verdicts exist. Roll
                // everything back to pending so the items stay retryable.
                warn!("[GradeSync] Batch request failed: {}", err.failure_text());
                let mut report = SyncReport::default();
                for item in &claimed {
                    self.store.mark_pending(&item.id).await?;
                    report.errors += 1;
                }
                return Ok(report);
            }
        };

        let mut unresolved: HashMap<&str, &QueueItem> = claimed
            .iter()
            .map(|item| (item.id.as_str(), item))
            .collect();
        let mut report = SyncReport::default();

        for result in &response.results {
            let item = match unresolved.remove(result.queue_id.as_str()) {
                Some(item) => item,
                None => {
                    warn!(
                        "[GradeSync] Batch result for unknown queue id {}",
                        result.queue_id
                    );
                    continue;
                }
            };
            if result.success {
                self.store.remove(&item.id).await?;
                report.synced += 1;
            } else if result.conflict {
                let server = result
                    .server_data
                    .clone()
                    .unwrap_or_else(ServerGrade::unknown);
                self.record_conflict(&mut report, item, server).await?;
            } else {
                let message = result
                    .message
                    .clone()
                    .unwrap_or_else(|| NETWORK_ERROR_FALLBACK.to_string());
                self.store.mark_error(&item.id, &message).await?;
                report.errors += 1;
            }
        }

        // Submitted items the server never mentioned roll back to pending.
        for item in unresolved.values() {
            warn!("[GradeSync] Batch response missing queue id {}", item.id);
            self.store.mark_pending(&item.id).await?;
            report.errors += 1;
        }

        info!(
            "[GradeSync] Batch pass complete synced={} errors={} conflicts={}",
            report.synced,
            report.errors,
            report.conflicts.len()
        );
        Ok(report)
    }

    /// Resolve a conflict by forcing the local value onto the server.
    pub async fn resolve_keep_local(&self, queue_id: &str) -> Result<ResolveOutcome, QueueError> {
        let item = match self.store.get(queue_id).await? {
            Some(item) => item,
            None => return Ok(ResolveOutcome::NotFound),
        };

        self.store.mark_syncing(&item.id).await?;
        match self.client.force_overwrite(&item.payload).await {
            Ok(()) => {
                self.store.remove(&item.id).await?;
                info!("[GradeSync] Grade {} overwrote the server value", item.id);
                Ok(ResolveOutcome::Applied)
            }
            Err(err) => {
                let message = err.failure_text();
                warn!("[GradeSync] Overwrite of grade {} failed: {}", item.id, message);
                self.store.mark_error(&item.id, &message).await?;
                Ok(ResolveOutcome::Failed)
            }
        }
    }

    /// Resolve a conflict by discarding the local value.
    ///
    /// The server value stands; callers refetch to display it.
    pub async fn resolve_keep_server(&self, queue_id: &str) -> Result<ResolveOutcome, QueueError> {
        if self.store.get(queue_id).await?.is_none() {
            return Ok(ResolveOutcome::NotFound);
        }
        self.store.remove(queue_id).await?;
        info!("[GradeSync] Grade {} dropped in favor of the server value", queue_id);
        Ok(ResolveOutcome::Applied)
    }

    /// Flip an item to syncing and read it back, so the request carries any
    /// edit that coalesced into the row after the pass listed it. Once the
    /// row is in flight, a new enqueue for the same cell opens a fresh item
    /// instead of touching this one. Returns `None` when the row no longer
    /// exists.
    async fn claim(&self, id: &str) -> Result<Option<QueueItem>, QueueError> {
        self.store.mark_syncing(id).await?;
        self.store.get(id).await
    }

    async fn record_conflict(
        &self,
        report: &mut SyncReport,
        item: &QueueItem,
        server: ServerGrade,
    ) -> Result<(), QueueError> {
        let message = conflict_message(&server.updated_by_name);
        warn!("[GradeSync] Conflict on grade {}: {}", item.id, message);
        self.store.mark_error(&item.id, &message).await?;
        report.conflicts.push(ConflictItem {
            queue_id: item.id.clone(),
            local_data: item.payload.clone(),
            server_data: server,
        });
        Ok(())
    }
}
