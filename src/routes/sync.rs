use crate::common::ApiResult;
use crate::extractors::UserId;
use crate::models::dtos::sync::SyncQueryDto;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Asks every other device of the caller to sync; `deviceId` names the requester.
pub async fn trigger_sync(
    State(state): State<AppState>,
    UserId(user): UserId,
    Query(query): Query<SyncQueryDto>,
) -> ApiResult<impl IntoResponse> {
    state
        .queue
        .trigger_sync(&user, query.device_id.as_deref(), query.token.as_deref())?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn trigger_cache_resync(
    State(state): State<AppState>,
    UserId(user): UserId,
) -> ApiResult<impl IntoResponse> {
    state.queue.trigger_cache_resync(Some(&user))?;
    Ok(StatusCode::ACCEPTED)
}
