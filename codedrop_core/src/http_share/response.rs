//! Error responses for the HTTP API.

use crate::error::TransferError;
use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Failure of an API request.
#[derive(Debug)]
pub enum ApiError {
    Transfer(TransferError),
    Multipart(MultipartError),
}

impl From<TransferError> for ApiError {
    fn from(err: TransferError) -> Self {
        ApiError::Transfer(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Multipart(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Transfer(err) => match err {
                TransferError::EmptyContent => StatusCode::BAD_REQUEST,
                TransferError::NotFound => StatusCode::NOT_FOUND,
                TransferError::Expired => StatusCode::GONE,
                TransferError::UploadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                TransferError::CodeSpaceExhausted => StatusCode::SERVICE_UNAVAILABLE,
                TransferError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Multipart(err) => err.status(),
        }
    }

    /// Client-facing message. Storage details stay in the log.
    fn message(&self) -> String {
        match self {
            ApiError::Transfer(TransferError::Storage(_)) => "Internal server error".to_string(),
            ApiError::Transfer(err) => err.to_string(),
            ApiError::Multipart(err) => err.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            match &self {
                ApiError::Transfer(err) => tracing::error!("Request failed: {}", err),
                ApiError::Multipart(err) => tracing::error!("Multipart failure: {}", err),
            }
        }

        let body = ErrorBody {
            error: self.message(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (TransferError::EmptyContent, StatusCode::BAD_REQUEST),
            (TransferError::NotFound, StatusCode::NOT_FOUND),
            (TransferError::Expired, StatusCode::GONE),
            (
                TransferError::UploadTooLarge { limit: 1 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                TransferError::Storage(StorageError::InvalidKey("x".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_storage_details_are_hidden() {
        let err = ApiError::from(TransferError::Storage(StorageError::InvalidKey(
            "/srv/data/uploads/secret".into(),
        )));
        assert!(!err.message().contains("/srv"));
    }
}
