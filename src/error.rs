//! # Error Handling
//!
//! Defines the application error type and how each variant becomes an HTTP
//! response. Every failure, whether it comes from the upload, the session
//! store or the upstream model, is reported with the same JSON shape:
//!
//! ```json
//! {
//!   "error": {
//!     "type": "missing_audio",
//!     "message": "Provider reply contained no audio media",
//!     "timestamp": "2025-01-01T12:00:00Z"
//!   }
//! }
//! ```

use crate::conversation::SessionError;
use crate::provider::ProviderError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Custom error types for the application.
///
/// ## Error Categories:
/// - **BadRequest / ValidationError**: the client sent something unusable (400)
/// - **NotFound**: unknown session (404)
/// - **PayloadTooLarge**: upload over the configured limit (413)
/// - **ServiceUnavailable**: session capacity exhausted (503)
/// - **Provider / MissingAudio**: the upstream model failed or replied without audio (502)
/// - **Timeout**: the upstream model did not answer in time (504)
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    ValidationError(String),
    PayloadTooLarge(String),
    ServiceUnavailable(String),
    Provider(String),
    MissingAudio(String),
    Timeout(String),
}

impl AppError {
    /// Machine-readable error type used in the JSON body.
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::ValidationError(_) => "validation_error",
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::ServiceUnavailable(_) => "service_unavailable",
            AppError::Provider(_) => "provider_error",
            AppError::MissingAudio(_) => "missing_audio",
            AppError::Timeout(_) => "provider_timeout",
        }
    }

    fn message(&self) -> &str {
        match self {
            AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::ValidationError(msg)
            | AppError::PayloadTooLarge(msg)
            | AppError::ServiceUnavailable(msg)
            | AppError::Provider(msg)
            | AppError::MissingAudio(msg)
            | AppError::Timeout(msg) => msg,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::PayloadTooLarge(msg) => write!(f, "Payload too large: {}", msg),
            AppError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            AppError::Provider(msg) => write!(f, "Provider error: {}", msg),
            AppError::MissingAudio(msg) => write!(f, "Missing audio: {}", msg),
            AppError::Timeout(msg) => write!(f, "Provider timeout: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Provider(_) | AppError::MissingAudio(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": self.error_type(),
                "message": self.message(),
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// A broken multipart stream means the upload could not be read.
impl From<actix_multipart::MultipartError> for AppError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        AppError::BadRequest(format!("Could not read upload: {}", err))
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        AppError::Provider(err.to_string())
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidId(_) => AppError::ValidationError(err.to_string()),
            SessionError::CapacityReached(_) => AppError::ServiceUnavailable(err.to_string()),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::PayloadTooLarge("x".into()), StatusCode::PAYLOAD_TOO_LARGE),
            (AppError::ServiceUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (AppError::Provider("x".into()), StatusCode::BAD_GATEWAY),
            (AppError::MissingAudio("x".into()), StatusCode::BAD_GATEWAY),
            (AppError::Timeout("x".into()), StatusCode::GATEWAY_TIMEOUT),
        ];

        for (err, expected) in cases {
            assert_eq!(err.status_code(), expected, "{}", err);
        }
    }

    #[actix_web::test]
    async fn test_error_body_shape() {
        let err = AppError::MissingAudio("Provider reply contained no audio media".into());
        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = to_bytes(response.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"]["type"], "missing_audio");
        assert_eq!(value["error"]["message"], "Provider reply contained no audio media");
        assert!(value["error"]["timestamp"].is_string());
    }

    #[test]
    fn test_provider_error_conversion() {
        let err: AppError = ProviderError::Status {
            status: 429,
            message: "Rate limit reached".into(),
        }
        .into();
        assert!(matches!(err, AppError::Provider(_)));
        assert!(err.to_string().contains("429"));
    }
}
