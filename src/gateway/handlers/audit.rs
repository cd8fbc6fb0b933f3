use std::sync::Arc;

use axum::extract::{Path, State};

use super::super::state::AppState;
use super::super::types::{ApiError, ApiResult, ok};
use crate::settlement::{AuditRecord, AuditTable};

/// Audit trail of one row, oldest first
#[utoipa::path(
    get,
    path = "/api/v1/audit/{table}/{record_id}",
    params(
        ("table" = String, Path, description = "entries | participants | transfers"),
        ("record_id" = String, Path, description = "Row id")
    ),
    responses(
        (status = 200, description = "Audit records", content_type = "application/json"),
        (status = 400, description = "Unknown table")
    ),
    tag = "Audit"
)]
pub async fn get_audit_history(
    State(state): State<Arc<AppState>>,
    Path((table, record_id)): Path<(String, String)>,
) -> ApiResult<Vec<AuditRecord>> {
    let table = table.parse::<AuditTable>().map_err(ApiError::bad_request)?;
    ok(state.service.get_audit_history(table, &record_id).await?)
}
