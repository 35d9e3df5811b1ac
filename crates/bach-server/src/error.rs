use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bach_core::BachError;

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        let Some(e) = self.0.downcast_ref::<BachError>() else {
            return StatusCode::INTERNAL_SERVER_ERROR;
        };
        match e {
            BachError::Configuration(_)
            | BachError::Syntax { .. }
            | BachError::InvalidSchedule(_)
            | BachError::Yaml(_)
            | BachError::Json(_) => StatusCode::BAD_REQUEST,
            BachError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            BachError::State { .. } => StatusCode::CONFLICT,
            BachError::Binding { .. } | BachError::Type { .. } | BachError::InvalidReport(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            BachError::Fetch(_) | BachError::Actor { .. } | BachError::Notification { .. } => {
                StatusCode::BAD_GATEWAY
            }
            BachError::Worker(_) | BachError::Store(_) | BachError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
