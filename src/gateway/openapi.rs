//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::OpenApi;

use crate::gateway::handlers::HealthResponse;
use crate::gateway::types::{
    AddParticipantRequest, MarkPaidRequest, OpenSessionRequest, RecordEntryRequest,
    UpdateEntryRequest,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Settle Engine API",
        version = "1.0.0",
        description = "Session ledger, integrity checks and debt-netting settlement for card-game sessions. Mutating calls identify the acting user with the X-Actor-Id header.",
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health_check,
        crate::gateway::handlers::open_session,
        crate::gateway::handlers::get_session,
        crate::gateway::handlers::close_session,
        crate::gateway::handlers::add_participant,
        crate::gateway::handlers::list_participants,
        crate::gateway::handlers::record_entry,
        crate::gateway::handlers::list_entries,
        crate::gateway::handlers::update_entry,
        crate::gateway::handlers::delete_entry,
        crate::gateway::handlers::validate_balance,
        crate::gateway::handlers::calculate_settlement,
        crate::gateway::handlers::get_settlement,
        crate::gateway::handlers::mark_paid,
        crate::gateway::handlers::revert_transfer,
        crate::gateway::handlers::get_audit_history,
    ),
    components(
        schemas(
            HealthResponse,
            OpenSessionRequest,
            AddParticipantRequest,
            RecordEntryRequest,
            UpdateEntryRequest,
            MarkPaidRequest,
        )
    ),
    tags(
        (name = "Sessions", description = "Session lifecycle and roster"),
        (name = "Entries", description = "Buy-ins and cash-outs"),
        (name = "Settlement", description = "Balance check, netting and payment tracking"),
        (name = "Audit", description = "Per-row mutation history"),
        (name = "System", description = "Health checks and system info")
    )
)]
pub struct ApiDoc;
