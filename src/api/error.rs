//! Rejection to HTTP response mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::types::ApiResponse;
use crate::error::{ErrorClass, RejectReason, Rejection};

/// Handler error carrying a caller-facing rejection
#[derive(Debug)]
pub struct ApiError(pub Rejection);

impl From<Rejection> for ApiError {
    fn from(r: Rejection) -> Self {
        Self(r)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.reason.class() {
            ErrorClass::Input => StatusCode::BAD_REQUEST,
            ErrorClass::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorClass::Identity => match self.0.reason {
                RejectReason::SignatureInvalid | RejectReason::AddressMismatch => {
                    StatusCode::UNAUTHORIZED
                }
                _ => StatusCode::FORBIDDEN,
            },
            ErrorClass::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ApiResponse {
            code: status.as_u16(),
            message: self.0.reason.code().to_string(),
            data: Some(self.0.detail),
        };
        (status, Json(body)).into_response()
    }
}
