use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::{
    engine::SessionError,
    models::{answer::RecordAnswerRequest, CreateSessionRequest},
    services::AppState,
};

/// HTTP status for an engine error.
pub fn error_status(error: &SessionError) -> StatusCode {
    match error {
        SessionError::SessionNotFound(_) | SessionError::UnknownQuestion(_) => {
            StatusCode::NOT_FOUND
        }
        SessionError::InvalidState { .. } | SessionError::AlreadyAnswered(_) => {
            StatusCode::CONFLICT
        }
        SessionError::EmptyQuestionSet
        | SessionError::InvalidOption(_)
        | SessionError::InvalidQuestion { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        SessionError::QuestionSource(_) => StatusCode::BAD_GATEWAY,
        SessionError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(error: SessionError) -> (StatusCode, String) {
    let status = error_status(&error);
    if status.is_server_error() {
        tracing::error!("Session request failed: {}", error);
    } else {
        tracing::debug!("Session request rejected: {}", error);
    }
    (status, error.to_string())
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    req.validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Validation error: {}", e)))?;

    tracing::info!(
        "Creating session: mode={}, exam_id={:?}, user_id={:?}",
        req.mode,
        req.exam_id,
        req.user_id
    );

    let response = state.sessions.create_session(req).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let snapshot = state.sessions.snapshot(&session_id).map_err(reject)?;
    Ok((StatusCode::OK, Json(snapshot)))
}

pub async fn record_answer(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<RecordAnswerRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::debug!(
        "Recording answer: session={}, question={}",
        session_id,
        req.question_id
    );

    let response = state
        .sessions
        .record_answer(&session_id, req)
        .map_err(reject)?;
    Ok((StatusCode::OK, Json(response)))
}

pub async fn submit_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Submitting session: {}", session_id);

    let finalization = state.sessions.submit(&session_id).await.map_err(reject)?;
    Ok((StatusCode::OK, Json(finalization.as_ref().clone())))
}

pub async fn abandon_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Abandoning session: {}", session_id);

    state.sessions.abandon(&session_id).map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}
