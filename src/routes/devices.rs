use crate::common::ApiResult;
use crate::extractors::UserId;
use crate::models::dtos::device::{RegisterDeviceBodyDto, UnregisterResponseDto};
use crate::models::{DeviceView, EventView};
use crate::routes::{cached_collection, follow_up};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;

pub async fn list(
    State(state): State<AppState>,
    UserId(user): UserId,
) -> ApiResult<impl IntoResponse> {
    let devices = state.cache.devices(&user).await?;
    Ok(cached_collection(devices))
}

pub async fn register(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(device_id): Path<String>,
    Json(body): Json<RegisterDeviceBodyDto>,
) -> ApiResult<impl IntoResponse> {
    let device = state
        .repository
        .register_device(
            &user,
            &device_id,
            body.name.as_deref(),
            body.push_token.as_deref(),
        )
        .await?;
    follow_up(&state, &user, Some(&device.id), Vec::new());
    Ok(Json(DeviceView::from(device)))
}

pub async fn unregister(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(device_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let removed = state
        .repository
        .unregister_device(&user, Some(&device_id))
        .await?;
    if !removed.is_empty() {
        follow_up(&state, &user, None, removed.clone());
    }
    Ok(Json(UnregisterResponseDto { removed }))
}

pub async fn unregister_all(
    State(state): State<AppState>,
    UserId(user): UserId,
) -> ApiResult<impl IntoResponse> {
    let removed = state.repository.unregister_device(&user, None).await?;
    if !removed.is_empty() {
        follow_up(&state, &user, None, removed.clone());
    }
    Ok(Json(UnregisterResponseDto { removed }))
}

pub async fn list_events(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(device_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let events = state.cache.events(&user, &device_id).await?;
    Ok(cached_collection(events))
}

pub async fn get_event(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path((device_id, event_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let event = state
        .repository
        .get_event(&user, &device_id, &event_id)
        .await?;
    Ok(Json(EventView::from(event)))
}
