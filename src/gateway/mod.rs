//! HTTP gateway
//!
//! Thin axum layer over [`SettlementService`](crate::settlement::SettlementService):
//! handlers extract the actor and body, call one service operation and wrap
//! the result in the `ApiResponse` envelope.

pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post, put},
};
use tokio::net::TcpListener;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::GatewayConfig;
use state::AppState;

/// Build the full router (API + Swagger UI)
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health_check))
        // Sessions and roster
        .route("/sessions", post(handlers::open_session))
        .route("/sessions/{id}", get(handlers::get_session))
        .route("/sessions/{id}/close", post(handlers::close_session))
        .route(
            "/sessions/{id}/participants",
            post(handlers::add_participant).get(handlers::list_participants),
        )
        // Entries
        .route(
            "/sessions/{id}/entries",
            post(handlers::record_entry).get(handlers::list_entries),
        )
        .route(
            "/entries/{id}",
            put(handlers::update_entry).delete(handlers::delete_entry),
        )
        // Integrity and settlement
        .route("/sessions/{id}/balance", get(handlers::validate_balance))
        .route(
            "/sessions/{id}/settlement",
            post(handlers::calculate_settlement).get(handlers::get_settlement),
        )
        .route("/transfers/{id}/paid", post(handlers::mark_paid))
        .route("/transfers/{id}/revert", post(handlers::revert_transfer))
        // Audit
        .route(
            "/audit/{table}/{record_id}",
            get(handlers::get_audit_history),
        );

    Router::new()
        .nest("/api/v1", api)
        .with_state(state)
        // Swagger UI is stateless, merged after with_state
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

pub async fn run_server(config: &GatewayConfig, state: Arc<AppState>) -> anyhow::Result<()> {
    let store = state.service.store_name();
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {} (port already in use?)", addr))?;

    info!(%addr, store, "Gateway listening");
    info!("API Docs: http://{}/docs", addr);

    axum::serve(listener, app).await.context("server error")
}
