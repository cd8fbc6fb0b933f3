//! API Response types and error codes
//!
//! - `ApiResponse<T>`: Unified response wrapper
//! - `ApiError`: handler error rendered as an `ApiResponse` with HTTP status
//! - `error_codes`: Standard error code constants

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::settlement::{ErrorKind, SettlementError, ValidationError};

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified API response wrapper
///
/// All API responses follow this structure:
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: actual data (success) or null (error)
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response code: 0 for success, non-zero for errors
    #[schema(example = 0)]
    pub code: i32,
    /// Response message
    #[schema(example = "ok")]
    pub msg: String,
    /// Response data (only present when code == 0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Create success response
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    /// Create error response
    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

// ============================================================================
// Handler Errors
// ============================================================================

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub msg: String,
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Wrap a successful handler result
pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

impl ApiError {
    pub fn new(status: StatusCode, code: i32, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            error_codes::INVALID_PARAMETER,
            msg,
        )
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error_codes::MISSING_ACTOR, msg)
    }
}

impl From<SettlementError> for ApiError {
    fn from(e: SettlementError) -> Self {
        let code = match e.kind() {
            ErrorKind::Validation => error_codes::INVALID_PARAMETER,
            ErrorKind::Forbidden => error_codes::FORBIDDEN,
            ErrorKind::NotFound => error_codes::NOT_FOUND,
            ErrorKind::State => error_codes::STATE_CONFLICT,
            ErrorKind::Integrity => error_codes::BALANCE_MISMATCH,
            ErrorKind::ConcurrencyTimeout => error_codes::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => error_codes::INTERNAL_ERROR,
        };
        let status =
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        // Store details stay in the log
        let msg = match e.kind() {
            ErrorKind::Internal => format!("{}: internal error", e.code()),
            _ => format!("{}: {}", e.code(), e),
        };
        Self::new(status, code, msg)
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        SettlementError::from(e).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiResponse::<()>::error(self.code, self.msg));
        (self.status, body).into_response()
    }
}

// ============================================================================
// Error Codes
// ============================================================================

/// Standard API error codes
pub mod error_codes {
    // Success
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;

    // Identity errors (2xxx)
    pub const MISSING_ACTOR: i32 = 2001;
    pub const FORBIDDEN: i32 = 2003;

    // Resource / state errors (4xxx)
    pub const NOT_FOUND: i32 = 4004;
    pub const STATE_CONFLICT: i32 = 4009;
    pub const BALANCE_MISMATCH: i32 = 4022;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
}
