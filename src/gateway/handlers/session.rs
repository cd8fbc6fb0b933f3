//! Session and roster handlers

use std::sync::Arc;

use axum::extract::{Path, State};

use super::super::state::AppState;
use super::super::types::{
    Actor, AddParticipantRequest, ApiResult, OpenSessionRequest, ValidJson, ok,
};
use crate::core_types::SessionId;
use crate::settlement::{Participant, Session};

/// Open a new session hosted by the acting user
#[utoipa::path(
    post,
    path = "/api/v1/sessions",
    request_body = OpenSessionRequest,
    params(("X-Actor-Id" = i64, Header, description = "Acting user id")),
    responses(
        (status = 200, description = "Session opened", content_type = "application/json"),
        (status = 400, description = "Invalid name"),
        (status = 401, description = "Missing actor")
    ),
    tag = "Sessions"
)]
pub async fn open_session(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    ValidJson(req): ValidJson<OpenSessionRequest>,
) -> ApiResult<Session> {
    ok(state.service.open_session(actor, &req.name).await?)
}

#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}",
    params(("id" = i64, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session", content_type = "application/json"),
        (status = 404, description = "Unknown session")
    ),
    tag = "Sessions"
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
) -> ApiResult<Session> {
    ok(state.service.get_session(id).await?)
}

/// Close the session (host only); required before settlement
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/close",
    params(
        ("id" = i64, Path, description = "Session id"),
        ("X-Actor-Id" = i64, Header, description = "Acting user id")
    ),
    responses(
        (status = 200, description = "Session closed", content_type = "application/json"),
        (status = 403, description = "Actor is not the host"),
        (status = 404, description = "Unknown session"),
        (status = 409, description = "Already closed")
    ),
    tag = "Sessions"
)]
pub async fn close_session(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<SessionId>,
) -> ApiResult<Session> {
    ok(state.service.close_session(id, actor).await?)
}

#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/participants",
    request_body = AddParticipantRequest,
    params(
        ("id" = i64, Path, description = "Session id"),
        ("X-Actor-Id" = i64, Header, description = "Acting user id")
    ),
    responses(
        (status = 200, description = "Participant added", content_type = "application/json"),
        (status = 403, description = "Actor may not add this user"),
        (status = 409, description = "Session closed or user already joined")
    ),
    tag = "Sessions"
)]
pub async fn add_participant(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<SessionId>,
    ValidJson(req): ValidJson<AddParticipantRequest>,
) -> ApiResult<Participant> {
    let user_id = req.user_id.unwrap_or(actor);
    ok(state
        .service
        .add_participant(id, user_id, &req.display_name, actor)
        .await?)
}

#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}/participants",
    params(("id" = i64, Path, description = "Session id")),
    responses(
        (status = 200, description = "Participants with totals", content_type = "application/json"),
        (status = 404, description = "Unknown session")
    ),
    tag = "Sessions"
)]
pub async fn list_participants(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
) -> ApiResult<Vec<Participant>> {
    ok(state.service.list_participants(id).await?)
}
