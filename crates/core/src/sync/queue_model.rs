//! Domain models for the offline grade mutation queue.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Display name recorded when the server omits who last edited a grade.
pub const UNKNOWN_EDITOR: &str = "Inconnu";

/// Message stored on items that failed without a server-provided reason.
pub const NETWORK_ERROR_FALLBACK: &str = "Erreur réseau";

/// Evaluation categories recognized by the grade endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvalType {
    Interro,
    Tp,
    ExamTrim,
    Synthese,
}

/// Mutation flavor carried by a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Create,
    Update,
}

/// Local lifecycle status of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Syncing,
    Error,
}

/// Grade mutation payload, field for field what the REST endpoints expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradePayload {
    pub student_id: String,
    pub subject_id: String,
    pub term_id: String,
    pub eval_type: EvalType,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
}

impl GradePayload {
    /// Identifying tuple of the grade cell this payload targets.
    pub fn grade_key(&self) -> (&str, &str, &str, EvalType) {
        (
            &self.student_id,
            &self.subject_id,
            &self.term_id,
            self.eval_type,
        )
    }
}

/// One queued grade mutation awaiting transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    pub kind: MutationKind,
    pub payload: GradePayload,
    pub enqueued_at: String,
    pub status: QueueStatus,
    pub error_message: Option<String>,
}

impl QueueItem {
    /// Build a fresh pending item with a generated id and enqueue timestamp.
    pub fn new(kind: MutationKind, payload: GradePayload) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            kind,
            payload,
            enqueued_at: Utc::now().to_rfc3339(),
            status: QueueStatus::Pending,
            error_message: None,
        }
    }
}

/// Server-side grade value reported alongside a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerGrade {
    pub score: f64,
    pub updated_at: String,
    pub updated_by_name: String,
}

impl ServerGrade {
    /// Placeholder used when the server reports a conflict without details.
    pub fn unknown() -> Self {
        Self {
            score: 0.0,
            updated_at: Utc::now().to_rfc3339(),
            updated_by_name: UNKNOWN_EDITOR.to_string(),
        }
    }
}

/// A queued mutation the server rejected because a newer value exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictItem {
    pub queue_id: String,
    pub local_data: GradePayload,
    pub server_data: ServerGrade,
}

/// Aggregate outcome of one synchronization pass.
///
/// Conflicts are reported separately and never counted in `errors`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub synced: usize,
    pub errors: usize,
    pub conflicts: Vec<ConflictItem>,
}

/// Result of a keep-local conflict resolution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveOutcome {
    Applied,
    Failed,
    NotFound,
}

/// Message stored on a conflicted item, naming who holds the newer value.
pub fn conflict_message(editor: &str) -> String {
    format!("Conflit: note déjà modifiée par {}", editor)
}
