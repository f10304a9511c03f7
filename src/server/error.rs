//! JSON error responses

use crate::error::{AuthError, ErrorCatalog};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// An `AuthError` already rendered through the catalog
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn render(catalog: &ErrorCatalog, err: &AuthError) -> Self {
        let rendered = catalog.render(err);

        if err.is_system() {
            error!(error = %err, code = %rendered.code, "Request failed");
        } else {
            debug!(error = %err, code = %rendered.code, "Request rejected");
        }

        Self {
            status: StatusCode::from_u16(rendered.status)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body: ErrorResponse {
                error: ErrorBody {
                    code: rendered.code,
                    message: rendered.message,
                },
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
