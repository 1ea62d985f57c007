//! Thin, explicitly peripheral control surface (spec §4.7): a handful of
//! `axum` routes that call straight into `scan-orchestrator` and
//! `progress-bus` with no business logic of their own.

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{self, Stream};
use scan_core::ScanError;
use scan_orchestrator::ScanOrchestrator;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ScanOrchestrator>,
}

/// Uniform envelope for the two plain-JSON endpoints, matching the
/// teacher's `api-server::ApiResponse` shape.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Maps `ScanError` onto HTTP status per spec §4.7: `ErrScanInProgress`
/// becomes `409 Conflict`, everything else is a `500`.
pub struct AppError(ScanError);

impl From<ScanError> for AppError {
    fn from(err: ScanError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            ScanError::ErrScanInProgress => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.0.to_string()),
        });
        (status, body).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/scan/trigger", post(trigger_scan))
        .route("/scan/status", get(scan_status))
        .route("/scan/events", get(scan_events))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// `POST /scan/trigger` — `202 Accepted` on success, `409 Conflict` if a
/// scan is already in progress (spec §4.7).
async fn trigger_scan(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.orchestrator.trigger_now().await?;
    Ok(StatusCode::ACCEPTED)
}

/// `GET /scan/status` — current tracker snapshot as JSON.
async fn scan_status(
    State(state): State<AppState>,
) -> Json<ApiResponse<scan_core::ScanStateSnapshot>> {
    let snapshot = state.orchestrator.tracker().snapshot().await;
    Json(ApiResponse::success(snapshot))
}

/// `GET /scan/events` — one `ProgressBus` subscription per connection,
/// forwarded as Server-Sent Events. The subscription itself replays the
/// synthetic `ScanStarted` for a late joiner (spec §4.4); this handler just
/// serializes whatever it receives.
async fn scan_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let sub = state
        .orchestrator
        .progress_bus()
        .subscribe_with_tracker(state.orchestrator.tracker())
        .await;

    Sse::new(event_stream(sub)).keep_alive(KeepAlive::default())
}

/// Drains an owned subscription into a stream of SSE events, one
/// JSON-encoded `ScanEvent` per message, until the bus closes the channel.
fn event_stream(sub: progress_bus::Subscription) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(sub, |mut sub| async move {
        let event = sub.recv().await?;
        let json = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Some((Ok(Event::default().data(json)), sub))
    })
}
