//! File delivery handler.

use super::super::{AppError, SharedState, URI_COMPONENT};
use super::request_origin;
use crate::delivery::{Delivery, DeliveryRequest};
use crate::error::Error;
use crate::session::AuthOutcome;
use axum::Extension;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use percent_encoding::utf8_percent_encode;
use tracing::error;

/// Long-lived caching for served files.
pub(crate) const FILE_CACHE_CONTROL: &str = "public, max-age=31536000";

/// `inline; filename="<percent-encoded name>"`.
pub(crate) fn inline_disposition(file_name: &str) -> String {
    format!(
        "inline; filename=\"{}\"",
        utf8_percent_encode(file_name, URI_COMPONENT)
    )
}

/// File routes answer failures in plain text rather than JSON.
fn plain_error(err: &Error) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(error = %err, "File delivery failed");
    }
    (status, err.to_string()).into_response()
}

/// GET /file/{id} - Serve a file through the delivery pipeline.
pub(crate) async fn serve_file(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    auth: Option<Extension<AuthOutcome>>,
) -> Result<Response, AppError> {
    let origin = request_origin(state.config.server.public_origin.as_deref(), &headers);
    let referer = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok());
    let principal = auth
        .as_ref()
        .and_then(|Extension(outcome)| outcome.principal.as_deref());

    let delivery = match state
        .delivery
        .deliver(DeliveryRequest {
            identifier: &id,
            referer,
            origin: &origin,
            principal,
        })
        .await
    {
        Ok(delivery) => delivery,
        Err(err @ Error::Upstream { .. }) => return Err(err.into()),
        Err(err) => return Ok(plain_error(&err)),
    };

    Ok(match delivery {
        Delivery::Serve(file) => (
            [
                (header::CONTENT_TYPE, file.content_type),
                (header::CACHE_CONTROL, FILE_CACHE_CONTROL.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    inline_disposition(&file.file_name),
                ),
            ],
            Body::from(file.body),
        )
            .into_response(),
        Delivery::Redirect(location) => {
            (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
        },
    })
}
