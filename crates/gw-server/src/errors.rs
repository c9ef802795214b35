//! Maps [`GatewayError`] onto the wire error envelope (spec §6/§7) at the
//! HTTP boundary. Every handler returns `Result<T, ApiError>` so this `impl
//! IntoResponse` is the single place the JSON shape is produced.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gw_core::error::ErrorEnvelope;
use gw_core::GatewayError;

pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let envelope = ErrorEnvelope::from(&self.0);
        let status = StatusCode::from_u16(envelope.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(envelope)).into_response()
    }
}
