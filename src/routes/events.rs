use crate::common::ApiResult;
use crate::extractors::UserId;
use crate::models::dtos::event::AddEventBodyDto;
use crate::models::{EventType, EventView};
use crate::routes::{collection, follow_up};
use crate::services::AddEventArgs;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Reserved event id of `DELETE /api/events/{event_id}` that wipes every event.
const ALL_EVENTS: &str = "all";

/// Every event of every device of the caller, straight from the repository.
pub async fn list(
    State(state): State<AppState>,
    UserId(user): UserId,
) -> ApiResult<impl IntoResponse> {
    let events = state
        .repository
        .list_events(&user, None)
        .await?
        .into_iter()
        .map(EventView::from)
        .collect::<Vec<_>>();
    Ok(collection(events))
}

pub async fn add(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(event_id): Path<String>,
    Json(body): Json<AddEventBodyDto>,
) -> ApiResult<impl IntoResponse> {
    let kind = EventType::try_from(body.kind)?;
    let event = state
        .repository
        .add_event(
            &user,
            &body.device_id,
            AddEventArgs {
                id: &event_id,
                occurred_at: body.created,
                kind,
                number: body.number.as_deref(),
                name: body.name.as_deref(),
                message: body.message.as_deref(),
            },
        )
        .await?;
    follow_up(&state, &user, Some(&event.device_id), Vec::new());
    Ok(Json(EventView::from(event)))
}

pub async fn delete(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(event_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if event_id == ALL_EVENTS {
        let removed = state.repository.delete_all_events(&user).await?;
        tracing::info!(user = %user, removed, "every event deleted on request");
        follow_up(&state, &user, None, Vec::new());
        return Ok(StatusCode::OK);
    }
    if let Some(event) = state.repository.delete_event(&user, &event_id).await? {
        follow_up(&state, &user, Some(&event.device_id), Vec::new());
    }
    Ok(StatusCode::OK)
}
