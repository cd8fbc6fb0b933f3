//! Request DTOs and extractors
//!
//! Bodies are parsed with [`ValidJson`] so malformed JSON comes back in the
//! same `ApiResponse` envelope as every other error. The acting identity is
//! taken from the `X-Actor-Id` header by [`Actor`]; authenticating that
//! header is the job of whatever sits in front of the gateway.

use axum::extract::{FromRequest, FromRequestParts, OptionalFromRequest, Request};
use axum::http::request::Parts;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use utoipa::ToSchema;

use super::response::ApiError;
use crate::core_types::{ParticipantId, UserId};
use crate::settlement::types::{EntryKind, EntryPatch};
use crate::settlement::validation::{self, AmountBounds, ValidationError};

/// Header carrying the acting user id
pub const ACTOR_HEADER: &str = "x-actor-id";

// ============================================================================
// Extractors
// ============================================================================

/// Acting user for audit records and authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ACTOR_HEADER)
            .ok_or_else(|| ApiError::unauthorized("Missing X-Actor-Id header"))?;
        raw.to_str()
            .ok()
            .and_then(|s| s.trim().parse::<UserId>().ok())
            .filter(|id| *id > 0)
            .map(Actor)
            .ok_or_else(|| ApiError::unauthorized("Invalid X-Actor-Id header"))
    }
}

/// `Json<T>` with an enveloped rejection
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = <Json<T> as FromRequest<S>>::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON: {}", e.body_text())))?;
        Ok(ValidJson(value))
    }
}

/// Body-less requests (no `Content-Type`) extract as `None`
impl<S, T> OptionalFromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Option<Self>, Self::Rejection> {
        let body = <Json<T> as OptionalFromRequest<S>>::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON: {}", e.body_text())))?;
        Ok(body.map(|Json(value)| ValidJson(value)))
    }
}

// ============================================================================
// Amount Input
// ============================================================================

/// Amount as a decimal string (`"12.50"`) or a JSON number (`12.5`)
///
/// Strings are parsed strictly; numbers go through their shortest decimal
/// representation.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Number(f64),
}

impl AmountInput {
    pub fn validate(&self, bounds: &AmountBounds) -> Result<Decimal, ValidationError> {
        match self {
            AmountInput::Text(s) => validation::validate_amount_str(s, bounds),
            AmountInput::Number(n) => validation::validate_amount_f64(*n, bounds),
        }
    }
}

fn parse_kind(kind: &str) -> Result<EntryKind, ApiError> {
    kind.parse::<EntryKind>().map_err(ApiError::bad_request)
}

// ============================================================================
// Request Bodies
// ============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct OpenSessionRequest {
    #[schema(example = "Friday poker")]
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddParticipantRequest {
    /// Defaults to the acting user
    pub user_id: Option<UserId>,
    #[schema(example = "Alice")]
    pub display_name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordEntryRequest {
    pub participant_id: ParticipantId,
    /// `debit` (buy-in) or `credit` (cash-out)
    #[schema(example = "debit")]
    pub kind: String,
    #[schema(value_type = String, example = "100.00")]
    pub amount: AmountInput,
}

impl RecordEntryRequest {
    pub fn kind(&self) -> Result<EntryKind, ApiError> {
        parse_kind(&self.kind)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateEntryRequest {
    pub participant_id: Option<ParticipantId>,
    pub kind: Option<String>,
    #[schema(value_type = Option<String>, example = "25.00")]
    pub amount: Option<AmountInput>,
}

impl UpdateEntryRequest {
    /// Parse into a patch; amounts are range-checked against `bounds`
    pub fn into_patch(self, bounds: &AmountBounds) -> Result<EntryPatch, ApiError> {
        Ok(EntryPatch {
            participant_id: self.participant_id,
            kind: self.kind.as_deref().map(parse_kind).transpose()?,
            amount: self.amount.map(|a| a.validate(bounds)).transpose()?,
        })
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct MarkPaidRequest {
    #[schema(example = "venmo")]
    pub payment_method: Option<String>,
}
