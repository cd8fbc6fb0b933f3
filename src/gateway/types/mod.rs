//! Gateway types module
//!
//! ## Input Types
//! - [`Actor`]: acting user from the `X-Actor-Id` header
//! - [`ValidJson`]: JSON body with an enveloped rejection
//! - [`AmountInput`]: decimal string or JSON number
//!
//! ## Output Types
//! - [`ApiResponse<T>`]: Unified API response wrapper
//! - [`ApiError`]: error response with HTTP status
//!
//! ## Submodules
//! - [`request`]: request bodies and extractors
//! - [`response`]: response types and error codes

pub mod request;
pub mod response;

pub use request::{
    ACTOR_HEADER, Actor, AddParticipantRequest, AmountInput, MarkPaidRequest, OpenSessionRequest,
    RecordEntryRequest, UpdateEntryRequest, ValidJson,
};
pub use response::{ApiError, ApiResponse, ApiResult, error_codes, ok};
