mod devices;
mod events;
mod sync;
mod system;
mod tasks;

use crate::middlewares::request_id::{RequestId, RequestIdLayer};
use crate::services::Cached;
use crate::state::AppState;
use axum::body::Body;
use axum::http::{HeaderName, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{
    Json, Router,
    routing::{get, post, put},
};
use serde::Serialize;
use std::time::Duration;
use tracing::Span;

pub const CACHE_HEADER: &str = "x-cache";

/// Span wrapping one request; at info so the default level still prints the id.
pub(crate) fn request_span(request: &Request<Body>) -> Span {
    match request.extensions().get::<RequestId>() {
        Some(request_id) => tracing::info_span!("request", request_id = %request_id),
        None => tracing::info_span!("request"),
    }
}

/// `204 No Content` for an empty list, the JSON array otherwise.
pub(crate) fn collection<T: Serialize>(items: Vec<T>) -> Response {
    if items.is_empty() {
        StatusCode::NO_CONTENT.into_response()
    } else {
        Json(items).into_response()
    }
}

/// Like [`collection`], also telling the client which path served it.
pub(crate) fn cached_collection<T: Serialize>(cached: Cached<Vec<T>>) -> Response {
    let source = cached.source.as_str();
    ([(HeaderName::from_static(CACHE_HEADER), source)], collection(cached.value)).into_response()
}

/// Queues the cache rebuild and sync push that follow a committed write.
///
/// The write already succeeded, so a queue failure is only logged; the periodic
/// resync repairs the cache later.
pub(crate) fn follow_up(
    state: &AppState,
    user: &str,
    triggering_device: Option<&str>,
    stale_devices: Vec<String>,
) {
    if let Err(err) = state.queue.after_write(user, triggering_device, stale_devices) {
        tracing::warn!(user, reason = ?err, "failed to schedule follow-up jobs");
    }
}

pub fn build() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(system::health))
        .route("/api/version", get(system::version))
        // ======== devices ========
        .route(
            "/api/devices",
            get(devices::list).delete(devices::unregister_all),
        )
        .route(
            "/api/devices/{device_id}",
            put(devices::register).delete(devices::unregister),
        )
        .route("/api/devices/{device_id}/events", get(devices::list_events))
        .route(
            "/api/devices/{device_id}/events/{event_id}",
            get(devices::get_event),
        )
        // ======== events ========
        .route("/api/events", get(events::list))
        .route(
            "/api/events/{event_id}",
            put(events::add).delete(events::delete),
        )
        // ======== sync ========
        .route("/api/sync", post(sync::trigger_sync))
        .route("/api/cache/resync", post(sync::trigger_cache_resync))
        // ======== jobs ========
        .route("/tasks/cache", post(tasks::cache))
        .route("/tasks/cache/clear", post(tasks::clear_cache))
        .route("/tasks/sync", post(tasks::sync))
        .route("/cron/cache", get(tasks::cron_cache))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_request(|req: &Request<Body>, _span: &Span| {
                    tracing::trace!(
                        method = %req.method(),
                        uri = %req.uri(),
                        version = %format!("{:?}", req.version()),
                        "started processing request"
                    );
                })
                .on_response(|res: &Response, latency: Duration, _span: &Span| {
                    tracing::trace!(
                        status = ?res.status(),
                        latency = %format!("{}ms", latency.as_millis()),
                        "finished processing request"
                    );
                }),
        )
        .layer(RequestIdLayer)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .expose_headers(tower_http::cors::Any)
                .allow_headers([
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::CONTENT_TYPE,
                ]),
        )
}
