/// Approval request REST API endpoints
///
/// Every mutating endpoint is a single engine call; lost optimistic-version
/// races are retried once before surfacing as 409.

use crate::{
    api::{retry_on_conflict, ApiError, AppState},
    directory::types::Identity,
    workflow::types::{
        Actor, ActorRole, ApprovalStep, AuditEntry, Decision, EscalationTarget, RequestDocument,
    },
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

/// Requester as supplied by the caller (email or display name)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBody {
    pub requester: String,
    #[serde(default)]
    pub department: Option<String>,
    pub category: String,
}

impl SubmitBody {
    fn identity(&self) -> Identity {
        match &self.department {
            Some(department) => Identity::new(&self.requester).with_department(department),
            None => Identity::new(&self.requester),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ActorBody {
    pub email: String,
    pub role: ActorRole,
}

impl From<ActorBody> for Actor {
    fn from(body: ActorBody) -> Self {
        Actor::new(body.email, body.role)
    }
}

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    pub actor: ActorBody,
    pub decision: Decision,
    #[serde(default)]
    pub comments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EscalateBody {
    pub actor: ActorBody,
    pub reason: String,
    #[serde(default = "default_target")]
    pub target: EscalationTarget,
}

fn default_target() -> EscalationTarget {
    EscalationTarget::NextLevel
}

#[derive(Debug, Deserialize)]
pub struct OverrideBody {
    pub actor: ActorBody,
    pub reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainPreview {
    pub requester: String,
    pub category: String,
    pub chain: Vec<ApprovalStep>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub request_id: String,
    pub entries: Vec<AuditEntry>,
}

pub fn create_request_routes() -> Router<AppState> {
    Router::new()
        .route("/api/chains/preview", post(preview_chain))
        .route("/api/requests", post(submit_request))
        .route("/api/requests/{id}", get(get_request))
        .route("/api/requests/{id}/decision", post(decide_request))
        .route("/api/requests/{id}/escalate", post(escalate_request))
        .route("/api/requests/{id}/override", post(override_request))
        .route("/api/requests/{id}/history", get(request_history))
}

/// Build the chain a submission would get, without creating anything
///
/// POST /api/chains/preview
/// Body: { "requester": "ann@corp.example", "category": "leave" }
async fn preview_chain(
    State(state): State<AppState>,
    Json(payload): Json<SubmitBody>,
) -> Result<Json<ChainPreview>, ApiError> {
    let chain = state
        .engine
        .build_chain(&payload.identity(), &payload.category)?;

    Ok(Json(ChainPreview {
        requester: payload.requester,
        category: payload.category.to_lowercase(),
        chain,
    }))
}

/// POST /api/requests
async fn submit_request(
    State(state): State<AppState>,
    Json(payload): Json<SubmitBody>,
) -> Result<(StatusCode, Json<RequestDocument>), ApiError> {
    let request = state
        .engine
        .submit(&payload.identity(), &payload.category)
        .await?;

    Ok((StatusCode::CREATED, Json(request.into())))
}

/// GET /api/requests/{id}
async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RequestDocument>, ApiError> {
    let request = state.engine.get(&id).await?;
    Ok(Json(request.into()))
}

/// POST /api/requests/{id}/decision
/// Body: { "actor": { "email": "...", "role": "approver" }, "decision": "approve", "comments": "..." }
async fn decide_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<DecisionBody>,
) -> Result<Json<RequestDocument>, ApiError> {
    let actor: Actor = payload.actor.into();
    let comments = payload.comments;

    let request = retry_on_conflict(|| {
        state
            .engine
            .decide(&id, &actor, payload.decision, comments.clone())
    })
    .await?;

    Ok(Json(request.into()))
}

/// POST /api/requests/{id}/escalate
/// Body: { "actor": {...}, "reason": "...", "target": "next_level" | "designated_authority" }
async fn escalate_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<EscalateBody>,
) -> Result<Json<RequestDocument>, ApiError> {
    let actor: Actor = payload.actor.into();

    let request = retry_on_conflict(|| {
        state
            .engine
            .escalate(&id, &actor, &payload.reason, payload.target)
    })
    .await?;

    Ok(Json(request.into()))
}

/// POST /api/requests/{id}/override
async fn override_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<OverrideBody>,
) -> Result<Json<RequestDocument>, ApiError> {
    let actor: Actor = payload.actor.into();

    let request = retry_on_conflict(|| state.engine.override_request(&id, &actor, &payload.reason)).await?;

    Ok(Json(request.into()))
}

/// GET /api/requests/{id}/history
async fn request_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let entries = state.engine.history(&id).await?;
    Ok(Json(HistoryResponse {
        request_id: id,
        entries,
    }))
}
