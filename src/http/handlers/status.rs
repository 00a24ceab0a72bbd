//! Status handler.

use super::super::SharedState;
use crate::status::{StatusReport, probe};
use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

/// GET /api/status - Backend reachability snapshot.
pub(crate) async fn status(State(state): State<SharedState>) -> impl IntoResponse {
    let report: StatusReport = probe(&state.backends, state.sessions.auth_required()).await;
    ([(header::CACHE_CONTROL, "no-cache")], Json(report))
}
