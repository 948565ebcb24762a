//! Ingress HTTP surface.
//!
//! Accepted events are handed to the fan-out dispatcher in the background; the response
//! never waits on downstream delivery.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::debug;

use crate::event::{now_unix_nanos, TelemetryEvent};
use crate::fanout::FanoutDispatcher;
use crate::provider::ProviderStatus;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub dispatcher: FanoutDispatcher,
}

/// Build the ingress router.
///
/// Routes:
/// - `POST /telemetry/event` accepts one event (`202`), other methods get `405`
/// - `GET /ping` liveness
/// - `GET /status` provider and circuit state
pub fn router(dispatcher: FanoutDispatcher) -> Router {
    Router::new()
        .route("/telemetry/event", post(accept_event))
        .route("/ping", get(ping))
        .route("/status", get(status))
        .with_state(AppState { dispatcher })
}

async fn accept_event(State(state): State<AppState>, body: Bytes) -> Response {
    let mut event: TelemetryEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            debug!(error = %e, "Rejected malformed event");
            return (StatusCode::BAD_REQUEST, format!("invalid telemetry event: {e}"))
                .into_response();
        }
    };
    event.normalize_time(now_unix_nanos());
    debug!(event = %event.name, "Accepted event");

    state.dispatcher.dispatch_detached(event);
    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))).into_response()
}

async fn ping() -> &'static str {
    "pong"
}

async fn status(State(state): State<AppState>) -> Json<Vec<ProviderStatus>> {
    Json(state.dispatcher.registry().snapshot())
}
