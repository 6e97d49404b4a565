/*
 * Responsibility
 * - /records 系 handler: create / get / state 遷移
 * - middleware が載せた AuthInfo からロールを解決し、model::state に委譲
 * - 永続化は record_repo (seam)。保存するのは常に遷移後の merged document
 */
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    api::v1::{
        dto::records::{CreateRecordRequest, RecordResponse, TransitionRequest},
        extractors::AuthInfoExtractor,
    },
    error::AppError,
    model::state::{self, Role},
    repos::record_repo,
    services::auth::AuthInfo,
    state::AppState,
};

/// The first recognized registry role wins; a caller whose token carries no
/// registry role cannot touch records at all.
fn role_of(auth: &AuthInfo) -> Result<Role, AppError> {
    auth.roles
        .iter()
        .find_map(|claim| Role::from_claim(claim))
        .ok_or_else(|| AppError::forbidden("no registry role"))
}

pub async fn create_record(
    State(app): State<AppState>,
    AuthInfoExtractor(auth): AuthInfoExtractor,
    Json(req): Json<CreateRecordRequest>,
) -> Result<(StatusCode, Json<RecordResponse>), AppError> {
    let role = role_of(&auth)?;

    let document = state::transition(None, &req.document, role, state::State::INITIAL)?;

    let id = Uuid::new_v4();
    record_repo::put(&app.records, id, document.clone())?;

    tracing::info!(record_id = %id, sub = %auth.sub, "record created");
    Ok((StatusCode::CREATED, Json(RecordResponse { id, document })))
}

pub async fn get_record(
    State(app): State<AppState>,
    AuthInfoExtractor(_auth): AuthInfoExtractor,
    Path(record_id): Path<Uuid>,
) -> Result<Json<RecordResponse>, AppError> {
    let document =
        record_repo::get(&app.records, record_id)?.ok_or_else(|| AppError::not_found("record"))?;

    Ok(Json(RecordResponse {
        id: record_id,
        document,
    }))
}

pub async fn transition_record(
    State(app): State<AppState>,
    AuthInfoExtractor(auth): AuthInfoExtractor,
    Path(record_id): Path<Uuid>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<RecordResponse>, AppError> {
    let role = role_of(&auth)?;

    let existing =
        record_repo::get(&app.records, record_id)?.ok_or_else(|| AppError::not_found("record"))?;

    let document = state::transition(Some(&existing), &req.document, role, req.destination)?;
    record_repo::put(&app.records, record_id, document.clone())?;

    tracing::info!(
        record_id = %record_id,
        sub = %auth.sub,
        destination = req.destination.as_str(),
        "record transitioned"
    );
    Ok(Json(RecordResponse {
        id: record_id,
        document,
    }))
}
