//! Job endpoints for an external queue substrate and cron. A transient failure
//! answers 500 so the caller retries; any other failure keeps its own status.

use crate::common::{ApiResult, AppError};
use crate::extractors::TaskCaller;
use crate::models::dtos::sync::{CacheTaskQueryDto, SyncTaskQueryDto};
use crate::services::Job;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

async fn run(state: &AppState, job: Job) -> Response {
    match state.runner.run(&job).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(err) if err.is_transient() => {
            tracing::warn!(job = %job, reason = ?err, "job failed, asking for a retry");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub async fn cache(
    State(state): State<AppState>,
    _caller: TaskCaller,
    Query(query): Query<CacheTaskQueryDto>,
) -> Response {
    let stale_devices = query.stale_devices();
    let job = Job::CacheResync {
        user: query.user.filter(|it| !it.is_empty()),
        stale_devices,
    };
    run(&state, job).await
}

pub async fn sync(
    State(state): State<AppState>,
    _caller: TaskCaller,
    Query(query): Query<SyncTaskQueryDto>,
) -> Response {
    if query.user.is_empty() {
        return AppError::invalid_argument("user is required").into_response();
    }
    let job = Job::PushNotify {
        user: query.user,
        triggering_device: query.device_id_source,
        sync_token: query.token,
    };
    run(&state, job).await
}

pub async fn clear_cache(State(state): State<AppState>, _caller: TaskCaller) -> impl IntoResponse {
    state.cache.clear();
    StatusCode::OK
}

/// Periodic trigger: rebuild the cache of every user with devices.
pub async fn cron_cache(
    State(state): State<AppState>,
    _caller: TaskCaller,
) -> ApiResult<impl IntoResponse> {
    state.queue.trigger_cache_resync(None)?;
    Ok(StatusCode::ACCEPTED)
}
