//! HTTP client for the school grade REST endpoints.

use log::debug;
use std::time::Duration;

use kelasi_core::sync::{GradePayload, ServerGrade};

use crate::error::{GradeApiError, Result};
use crate::types::{
    ApiErrorResponse, BatchGradeEntry, BatchSyncRequest, BatchSyncResponse, ConflictResponse,
    ForceOverwriteRequest,
};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;

/// Client for the school administration grade API.
#[derive(Debug, Clone)]
pub struct GradeApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl GradeApiClient {
    /// Create a new grade API client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the school API (e.g., "https://api.kelasi.cd")
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("API response error ({}): {}", status, preview);
    }

    /// Build the error for a non-success response.
    ///
    /// A 409 carries the server's current value for the grade cell; when the
    /// body omits or garbles it, a placeholder takes its place so conflicts
    /// always surface with something to show.
    fn error_from_parts(status: u16, body: &str) -> GradeApiError {
        if status == 409 {
            let server = serde_json::from_str::<ConflictResponse>(body)
                .ok()
                .and_then(|conflict| conflict.server_data)
                .unwrap_or_else(ServerGrade::unknown);
            return GradeApiError::Conflict { server };
        }

        if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(body) {
            return GradeApiError::api(status, format!("{}: {}", error.code, error.message));
        }
        GradeApiError::api(status, format!("Request failed: {}", body))
    }

    /// Check a write response, discarding the success body.
    async fn check_response(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            debug!("API response status: {}", status);
            return Ok(());
        }

        let body = response.text().await?;
        Self::log_response(status, &body);
        Err(Self::error_from_parts(status.as_u16(), &body))
    }

    /// Parse a JSON response body.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            return Err(Self::error_from_parts(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            log::error!(
                "Failed to deserialize response. Body: {}, Error: {}",
                body,
                e
            );
            GradeApiError::api(status.as_u16(), format!("Failed to parse response: {}", e))
        })
    }

    /// Create a grade.
    ///
    /// POST /grades
    pub async fn create_grade(&self, payload: &GradePayload) -> Result<()> {
        let url = format!("{}/grades", self.base_url);
        let response = self.client.post(&url).json(payload).send().await?;
        Self::check_response(response).await
    }

    /// Update an existing grade.
    ///
    /// PUT /grades/{studentId}
    pub async fn update_grade(&self, payload: &GradePayload) -> Result<()> {
        let url = format!("{}/grades/{}", self.base_url, payload.student_id);
        let response = self.client.put(&url).json(payload).send().await?;
        Self::check_response(response).await
    }

    /// Submit a backlog of queued mutations in one request.
    ///
    /// POST /grades/sync
    pub async fn sync_batch(&self, entries: Vec<BatchGradeEntry>) -> Result<BatchSyncResponse> {
        if entries.is_empty() {
            return Err(GradeApiError::invalid_request(
                "Batch submission requires at least one grade",
            ));
        }

        let url = format!("{}/grades/sync", self.base_url);
        debug!("[GradeSync] Submitting batch of {} grades", entries.len());
        let response = self
            .client
            .post(&url)
            .json(&BatchSyncRequest { grades: entries })
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Re-submit a grade over the server's value after a keep-local decision.
    ///
    /// POST /grades (forceOverwrite)
    pub async fn force_overwrite(&self, payload: &GradePayload) -> Result<()> {
        let url = format!("{}/grades", self.base_url);
        let body = ForceOverwriteRequest {
            payload: payload.clone(),
            force_overwrite: true,
        };
        let response = self.client.post(&url).json(&body).send().await?;
        Self::check_response(response).await
    }
}
