//! Maps [`ForemanError`] values onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use foreman_core::ForemanError;
use tracing::error;

/// Wrapper that turns a [`ForemanError`] into a JSON error response.
///
/// Handlers return `Result<_, ApiError>` and use `?` on anything that
/// yields a [`ForemanError`]; the status code falls out of the variant.
#[derive(Debug)]
pub struct ApiError(ForemanError);

impl From<ForemanError> for ApiError {
    fn from(err: ForemanError) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// Status code this error renders with.
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ForemanError::NotFound { .. } => StatusCode::NOT_FOUND,
            ForemanError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ForemanError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}
