//! Participation recording endpoint

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::services::{Demographics, RecordOutcome};
use crate::AppState;
use civiq_common::Error;

/// POST /api/participation request body
#[derive(Debug, Deserialize)]
pub struct ParticipationRequest {
    pub user_id: String,
    pub poll_id: String,
    #[serde(default)]
    pub demographics: Option<Demographics>,
}

/// POST /api/participation
///
/// Records one participation event. Returns 503 when the backing store is
/// unreachable; enrichment failures never fail the call.
pub async fn record_participation(
    State(state): State<AppState>,
    Json(request): Json<ParticipationRequest>,
) -> Result<Json<RecordOutcome>, ParticipationError> {
    if request.user_id.trim().is_empty() || request.poll_id.trim().is_empty() {
        return Err(ParticipationError::BadRequest(
            "user_id and poll_id are required".to_string(),
        ));
    }

    let outcome = state
        .engine
        .recorder
        .record_participation(&request.user_id, &request.poll_id, request.demographics)
        .await?;

    Ok(Json(outcome))
}

/// Participation API errors
#[derive(Debug)]
pub enum ParticipationError {
    BadRequest(String),
    StoreUnavailable(String),
    Internal(String),
}

impl From<Error> for ParticipationError {
    fn from(err: Error) -> Self {
        match err {
            Error::DependencyUnavailable(msg) => ParticipationError::StoreUnavailable(msg),
            Error::Validation(msg) => ParticipationError::BadRequest(msg),
            other => ParticipationError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ParticipationError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ParticipationError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ParticipationError::StoreUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ParticipationError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
