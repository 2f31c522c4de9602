//! Wire types for the grade REST endpoints.

use serde::{Deserialize, Serialize};

use kelasi_core::sync::{GradePayload, ServerGrade};

/// Error body returned by the grade service on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub code: String,
    pub message: String,
}

/// Body of a 409 response carrying the server's current value.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub server_data: Option<ServerGrade>,
}

/// One queued mutation inside a batch submission.
///
/// `_queueId` is an opaque correlation tag; the server echoes it back so
/// results can be matched to local items regardless of response order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchGradeEntry {
    #[serde(rename = "_queueId")]
    pub queue_id: String,
    #[serde(flatten)]
    pub payload: GradePayload,
}

/// Batch submission envelope.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSyncRequest {
    pub grades: Vec<BatchGradeEntry>,
}

/// Per-item outcome inside a batch response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGradeResult {
    #[serde(rename = "_queueId")]
    pub queue_id: String,
    pub success: bool,
    #[serde(default)]
    pub conflict: bool,
    #[serde(default)]
    pub server_data: Option<ServerGrade>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Batch response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSyncResponse {
    pub results: Vec<BatchGradeResult>,
}

/// Create body re-submitted over the server's value after a keep-local
/// conflict decision.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceOverwriteRequest {
    #[serde(flatten)]
    pub payload: GradePayload,
    pub force_overwrite: bool,
}
