//! Maps prediction errors onto `{"detail": ...}` JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use predictor_core::PredictError;
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    Predict(PredictError),
    RouteNotFound,
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Predict(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            Self::Predict(e) if e.is_invalid_input() => StatusCode::BAD_REQUEST,
            Self::Predict(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::RouteNotFound => StatusCode::NOT_FOUND,
        }
    }

    pub fn detail(&self) -> String {
        match self {
            Self::Predict(e) => e.to_string(),
            Self::RouteNotFound => "Not Found".into(),
            Self::Internal(_) => "Internal server error".into(),
        }
    }

    /// Label used on the request counter.
    pub fn outcome(&self) -> &'static str {
        match self.status() {
            StatusCode::NOT_FOUND => "not_found",
            StatusCode::BAD_REQUEST => "invalid",
            _ => "error",
        }
    }
}

impl From<PredictError> for ApiError {
    fn from(e: PredictError) -> Self { Self::Predict(e) }
}

pub fn detail_response(status: StatusCode, detail: &str) -> Response {
    (status, Json(json!({ "detail": detail }))).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(reason) = &self { tracing::error!(%reason, "internal error"); }
        detail_response(self.status(), &self.detail())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ApiError::from(PredictError::NotFound("x".into())).status(), StatusCode::NOT_FOUND);
        let missing = ApiError::from(PredictError::MissingValues(vec!["glucose".into()]));
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
        assert_eq!(missing.detail(), "Missing values: ['glucose']");
        assert_eq!(missing.outcome(), "invalid");
        assert_eq!(ApiError::Internal("join".into()).detail(), "Internal server error");
        assert_eq!(ApiError::RouteNotFound.detail(), "Not Found");
    }
}
