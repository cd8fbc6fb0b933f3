//! Balance, settlement and transfer payment handlers

use std::sync::Arc;

use axum::extract::{Path, State};

use super::super::state::AppState;
use super::super::types::{Actor, ApiError, ApiResult, MarkPaidRequest, ValidJson, ok};
use crate::core_types::SessionId;
use crate::settlement::{BalanceReport, SettlementView, Transfer, TransferId};

fn parse_transfer_id(raw: &str) -> Result<TransferId, ApiError> {
    raw.parse::<TransferId>()
        .map_err(|e| ApiError::bad_request(format!("Invalid transfer id {}: {}", raw, e)))
}

/// Integrity check: credits must equal debits within tolerance
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}/balance",
    params(("id" = i64, Path, description = "Session id")),
    responses(
        (status = 200, description = "Balance report", content_type = "application/json"),
        (status = 404, description = "Unknown session")
    ),
    tag = "Settlement"
)]
pub async fn validate_balance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
) -> ApiResult<BalanceReport> {
    ok(state.service.validate_session_balance(id).await?)
}

/// Compute the transfer list; repeated calls return the stored set
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/settlement",
    params(
        ("id" = i64, Path, description = "Session id"),
        ("X-Actor-Id" = i64, Header, description = "Acting user id")
    ),
    responses(
        (status = 200, description = "Transfers", content_type = "application/json"),
        (status = 409, description = "Session still open"),
        (status = 422, description = "Credits and debits do not balance"),
        (status = 503, description = "Lock timeout, retry")
    ),
    tag = "Settlement"
)]
pub async fn calculate_settlement(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<SessionId>,
) -> ApiResult<Vec<Transfer>> {
    ok(state.service.calculate_settlement(id, actor).await?)
}

#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}/settlement",
    params(("id" = i64, Path, description = "Session id")),
    responses(
        (status = 200, description = "Stored settlement", content_type = "application/json"),
        (status = 404, description = "Unknown session")
    ),
    tag = "Settlement"
)]
pub async fn get_settlement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
) -> ApiResult<SettlementView> {
    ok(state.service.get_settlement(id).await?)
}

/// PENDING -> PAID
#[utoipa::path(
    post,
    path = "/api/v1/transfers/{id}/paid",
    request_body = Option<MarkPaidRequest>,
    params(
        ("id" = String, Path, description = "Transfer id (ULID)"),
        ("X-Actor-Id" = i64, Header, description = "Acting user id")
    ),
    responses(
        (status = 200, description = "Transfer paid", content_type = "application/json"),
        (status = 403, description = "Actor is not host, payer or payee"),
        (status = 409, description = "Already paid")
    ),
    tag = "Settlement"
)]
pub async fn mark_paid(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
    body: Option<ValidJson<MarkPaidRequest>>,
) -> ApiResult<Transfer> {
    let transfer_id = parse_transfer_id(&id)?;
    let req = body.map(|ValidJson(req)| req).unwrap_or_default();
    ok(state
        .service
        .mark_transfer_paid(transfer_id, req.payment_method.as_deref(), actor)
        .await?)
}

/// PAID -> PENDING
#[utoipa::path(
    post,
    path = "/api/v1/transfers/{id}/revert",
    params(
        ("id" = String, Path, description = "Transfer id (ULID)"),
        ("X-Actor-Id" = i64, Header, description = "Acting user id")
    ),
    responses(
        (status = 200, description = "Transfer pending again", content_type = "application/json"),
        (status = 403, description = "Actor is not host, payer or payee"),
        (status = 409, description = "Not paid")
    ),
    tag = "Settlement"
)]
pub async fn revert_transfer(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
) -> ApiResult<Transfer> {
    let transfer_id = parse_transfer_id(&id)?;
    ok(state.service.revert_transfer(transfer_id, actor).await?)
}
