use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use leadflow_core::CrmError;

/// HTTP-facing error wrapper. Every failure renders as the same envelope
/// the success path uses, with `success: false` and a machine-readable
/// code.
#[derive(Debug)]
pub struct ApiError(pub CrmError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            CrmError::TenantRequired | CrmError::Validation(_) => StatusCode::BAD_REQUEST,
            CrmError::Conflict(_) => StatusCode::CONFLICT,
            CrmError::NotFound(_) => StatusCode::NOT_FOUND,
            CrmError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CrmError> for ApiError {
    fn from(e: CrmError) -> Self {
        ApiError(e)
    }
}

impl From<leadflow_store::StoreError> for ApiError {
    fn from(e: leadflow_store::StoreError) -> Self {
        ApiError(e.into())
    }
}

impl From<leadflow_engine::EngineError> for ApiError {
    fn from(e: leadflow_engine::EngineError) -> Self {
        ApiError(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Storage details stay in the log, not the response body
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "internal error");
            "internal error".to_string()
        } else {
            self.0.to_string()
        };
        let body = serde_json::json!({
            "success": false,
            "error": {
                "code": self.0.error_kind(),
                "message": message,
            },
        });
        (status, Json(body)).into_response()
    }
}
