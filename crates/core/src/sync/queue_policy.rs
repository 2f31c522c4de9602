//! Routing policy for sync passes.

/// Pending-item count above which a drain goes through the batch endpoint.
pub const BATCH_SYNC_THRESHOLD: usize = 5;

/// True when a backlog of `pending` items should drain through one batch call.
pub fn use_batch_path(pending: usize) -> bool {
    pending > BATCH_SYNC_THRESHOLD
}
