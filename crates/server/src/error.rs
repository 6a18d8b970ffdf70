use api_types::ErrorResponse;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fleet_core::tracking::TrackingError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Tracking(#[from] TrackingError),
    #[error("rate limit exceeded")]
    RateLimited,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Tracking(TrackingError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ApiError::Tracking(TrackingError::InsufficientStops { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Tracking(TrackingError::ProviderUnavailable(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Tracking(TrackingError::CachePersistFailure(_))
            | ApiError::Tracking(TrackingError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "internal error".to_owned()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}
