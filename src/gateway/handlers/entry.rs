//! Entry (buy-in / cash-out) handlers

use std::sync::Arc;

use axum::extract::{Path, State};

use super::super::state::AppState;
use super::super::types::{
    Actor, ApiResult, RecordEntryRequest, UpdateEntryRequest, ValidJson, ok,
};
use crate::core_types::{EntryId, SessionId};
use crate::settlement::Entry;

/// Record a buy-in (`debit`) or cash-out (`credit`)
///
/// `amount` may be a decimal string or a JSON number; at most 2 decimals.
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/entries",
    request_body = RecordEntryRequest,
    params(
        ("id" = i64, Path, description = "Session id"),
        ("X-Actor-Id" = i64, Header, description = "Acting user id")
    ),
    responses(
        (status = 200, description = "Entry recorded", content_type = "application/json"),
        (status = 400, description = "Invalid amount or kind"),
        (status = 403, description = "Actor is neither host nor the participant"),
        (status = 409, description = "Settlement already computed"),
        (status = 503, description = "Lock timeout, retry")
    ),
    tag = "Entries"
)]
pub async fn record_entry(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<SessionId>,
    ValidJson(req): ValidJson<RecordEntryRequest>,
) -> ApiResult<Entry> {
    let kind = req.kind()?;
    let amount = req
        .amount
        .validate(&state.service.config().entry_bounds)?;
    ok(state
        .service
        .record_entry(id, req.participant_id, kind, amount, actor)
        .await?)
}

#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}/entries",
    params(("id" = i64, Path, description = "Session id")),
    responses(
        (status = 200, description = "Entries in id order", content_type = "application/json"),
        (status = 404, description = "Unknown session")
    ),
    tag = "Entries"
)]
pub async fn list_entries(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
) -> ApiResult<Vec<Entry>> {
    ok(state.service.list_entries(id).await?)
}

#[utoipa::path(
    put,
    path = "/api/v1/entries/{id}",
    request_body = UpdateEntryRequest,
    params(
        ("id" = i64, Path, description = "Entry id"),
        ("X-Actor-Id" = i64, Header, description = "Acting user id")
    ),
    responses(
        (status = 200, description = "Entry updated", content_type = "application/json"),
        (status = 400, description = "Empty or invalid patch"),
        (status = 404, description = "Unknown entry"),
        (status = 409, description = "Settlement already computed")
    ),
    tag = "Entries"
)]
pub async fn update_entry(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<EntryId>,
    ValidJson(req): ValidJson<UpdateEntryRequest>,
) -> ApiResult<Entry> {
    let patch = req.into_patch(&state.service.config().entry_bounds)?;
    ok(state.service.update_entry(id, patch, actor).await?)
}

#[utoipa::path(
    delete,
    path = "/api/v1/entries/{id}",
    params(
        ("id" = i64, Path, description = "Entry id"),
        ("X-Actor-Id" = i64, Header, description = "Acting user id")
    ),
    responses(
        (status = 200, description = "Removed entry", content_type = "application/json"),
        (status = 404, description = "Unknown entry"),
        (status = 409, description = "Settlement already computed")
    ),
    tag = "Entries"
)]
pub async fn delete_entry(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<EntryId>,
) -> ApiResult<Entry> {
    ok(state.service.delete_entry(id, actor).await?)
}
