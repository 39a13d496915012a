//! HTTP mapping for [`ShopError`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::ShopError;

#[derive(Serialize)]
struct Failure {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
}

impl ShopError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::AlreadyExists(_) | Self::Verification(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ShopError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let (message, errors) = match self {
            Self::Validation { message, errors } => (message, errors),
            Self::Storage(_) | Self::Internal(_) => ("internal server error".to_string(), Vec::new()),
            other => (other.to_string(), Vec::new()),
        };
        (status, Json(Failure { success: false, message, errors })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::VerificationError;
    use crate::repository::RepoError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ShopError::invalid("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ShopError::Conflict("dup".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(ShopError::AlreadyExists("dup".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ShopError::from(VerificationError::NotPaid { status: "ready".into() }).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ShopError::from(RepoError::NotFound).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
