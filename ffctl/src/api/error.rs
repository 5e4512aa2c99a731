use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::api::types::ErrorResponse;

pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            detail: detail.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, detail)
    }

    pub fn not_found(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message, detail)
    }

    pub fn internal(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, detail)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            code: self.status.as_u16(),
            message: self.message,
            detail: if self.detail.is_empty() {
                None
            } else {
                Some(self.detail)
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ffctl_task::Error> for ApiError {
    fn from(err: ffctl_task::Error) -> Self {
        use ffctl_task::Error;

        let detail = err.to_string();
        match err {
            Error::NotFound => Self::not_found("Unknown process ID", detail),
            Error::TaskExists => Self::bad_request("Task exists", detail),
            Error::InvalidConfig => Self::bad_request("Invalid config", detail),
            Error::InvalidInputAddress | Error::InvalidOutputAddress => {
                Self::bad_request("Invalid address", detail)
            }
            Error::Process(_) | Error::Transcoder(_) => Self::internal("Command failed", detail),
        }
    }
}
