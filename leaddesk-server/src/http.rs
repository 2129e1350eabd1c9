//! LeadDesk HTTP REST API
//!
//! Axum-based transport over the `LeadDesk` engine.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to an
//! inner function returning `(StatusCode, serde_json::Value)`. The inner
//! functions are directly testable without axum dispatch machinery.
//!
//! Agent endpoints take `Authorization: Bearer <token>`. Errors are returned as
//! `{"error": <code>, "message": <text>}` with the status picked from the
//! error kind.

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use leaddesk_core::models::{LeadStatus, MissedChatTimer, NewAgent};
use leaddesk_core::{ErrorKind, LeadDeskError, Session, SessionVerifier};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::desk::LeadDesk;
use crate::subsystems::ticket::is_ticket_id;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub desk: LeadDesk,
    pub sessions: Arc<dyn SessionVerifier>,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/leads", post(create_lead_handler))
        .route(
            "/leads/:lead_id",
            get(contact_view_handler).put(contact_message_handler),
        )
        .route("/leads/:lead_id/details", post(contact_details_handler))
        .route("/tickets", get(list_tickets_handler))
        .route(
            "/tickets/:ticket_id",
            get(ticket_conversation_handler).put(agent_reply_handler),
        )
        .route("/tickets/:ticket_id/status", put(update_status_handler))
        .route("/tickets/:ticket_id/assignees", get(assignees_handler))
        .route("/tickets/:ticket_id/assignee", put(assign_handler))
        .route(
            "/agents",
            get(list_agents_handler).post(register_agent_handler),
        )
        .route(
            "/agents/:agent_id",
            get(agent_details_handler)
                .put(update_agent_handler)
                .delete(remove_agent_handler),
        )
        .route(
            "/settings",
            get(settings_handler).put(update_settings_handler),
        )
        .route("/analytics", get(analytics_handler))
        .route("/sla/sweep", post(sweep_handler))
        .with_state(state)
}

/// Start the HTTP server on `host:port`.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<HttpState>,
    host: &str,
    port: u16,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", host, port);
    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("LeadDesk HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct MessageRequest {
    pub message: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ContactDetailsRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TicketQuery {
    /// `resolved`, `unresolved`, or `all` / absent for no filter.
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub agent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct SettingsRequest {
    pub missed_chat_timer: MissedChatTimer,
}

// ============================================================================
// Error mapping
// ============================================================================

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::Dependency => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_response(err: &LeadDeskError) -> (StatusCode, serde_json::Value) {
    let kind = err.kind();
    let message = match kind {
        ErrorKind::Internal => {
            tracing::error!(error = %err, "Internal error");
            "An internal error occurred".to_string()
        }
        ErrorKind::Dependency => {
            tracing::warn!(error = %err, "Dependency unavailable");
            err.to_string()
        }
        _ => err.to_string(),
    };
    (
        status_for(kind),
        serde_json::json!({
            "error": kind.code(),
            "message": message,
        }),
    )
}

fn respond<T: Serialize>(
    success: StatusCode,
    result: leaddesk_core::Result<T>,
) -> (StatusCode, serde_json::Value) {
    match result {
        Ok(value) => match serde_json::to_value(value) {
            Ok(body) => (success, body),
            Err(e) => error_response(&LeadDeskError::Io(e.into())),
        },
        Err(e) => error_response(&e),
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// The credential from `Authorization: Bearer <token>`, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

async fn authenticate(state: &HttpState, token: Option<&str>) -> leaddesk_core::Result<Session> {
    let token = token.ok_or_else(|| {
        LeadDeskError::Unauthenticated("missing bearer token".to_string())
    })?;
    state.sessions.verify(token).await
}

fn parse_id(value: &str, what: &str) -> leaddesk_core::Result<Uuid> {
    Uuid::parse_str(value.trim())
        .map_err(|_| LeadDeskError::validation(format!("invalid {what}: {value}")))
}

fn check_ticket(ticket_id: &str) -> leaddesk_core::Result<()> {
    if is_ticket_id(ticket_id) {
        Ok(())
    } else {
        Err(LeadDeskError::validation(format!("invalid ticket id: {ticket_id}")))
    }
}

/// `None` means every status.
pub fn parse_status_filter(value: Option<&str>) -> leaddesk_core::Result<Option<LeadStatus>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.eq_ignore_ascii_case("all") => Ok(None),
        Some(v) => LeadStatus::parse(v)
            .map(Some)
            .ok_or_else(|| LeadDeskError::validation(format!("unknown status: {v}"))),
    }
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

pub async fn health_inner(desk: &LeadDesk) -> (StatusCode, serde_json::Value) {
    match desk.call(desk.store().health()).await {
        Ok(store) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "store": store,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e.to_string(),
            }),
        ),
    }
}

/// Pure, no IO.
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "service": "leaddesk",
    })
}

pub async fn create_lead_inner(desk: &LeadDesk, req: MessageRequest) -> (StatusCode, serde_json::Value) {
    let result = desk
        .create_lead(req.message.as_deref().unwrap_or_default())
        .await
        .map(|lead| {
            serde_json::json!({
                "lead_id": lead.id,
                "ticket_id": lead.ticket_id,
            })
        });
    respond(StatusCode::CREATED, result)
}

pub async fn contact_view_inner(desk: &LeadDesk, lead_id: &str) -> (StatusCode, serde_json::Value) {
    let result = async {
        let lead_id = parse_id(lead_id, "lead id")?;
        desk.contact_view(lead_id).await
    }
    .await;
    respond(StatusCode::OK, result)
}

pub async fn contact_message_inner(
    desk: &LeadDesk,
    lead_id: &str,
    req: MessageRequest,
) -> (StatusCode, serde_json::Value) {
    let result = async {
        let lead_id = parse_id(lead_id, "lead id")?;
        desk.append_contact_message(lead_id, req.message.as_deref().unwrap_or_default())
            .await
    }
    .await;
    respond(StatusCode::CREATED, result)
}

pub async fn contact_details_inner(
    desk: &LeadDesk,
    lead_id: &str,
    req: ContactDetailsRequest,
) -> (StatusCode, serde_json::Value) {
    let result = async {
        let lead_id = parse_id(lead_id, "lead id")?;
        desk.submit_contact_details(
            lead_id,
            req.name.as_deref().unwrap_or_default(),
            req.email.as_deref().unwrap_or_default(),
            req.phone.as_deref().unwrap_or_default(),
        )
        .await?;
        desk.contact_view(lead_id).await
    }
    .await;
    respond(StatusCode::OK, result)
}

pub async fn list_tickets_inner(
    state: &HttpState,
    token: Option<&str>,
    query: TicketQuery,
) -> (StatusCode, serde_json::Value) {
    let result = async {
        let session = authenticate(state, token).await?;
        let status = parse_status_filter(query.status.as_deref())?;
        let leads = state.desk.list_for_agent(&session, status).await?;
        Ok(serde_json::json!({
            "total": leads.len(),
            "leads": leads,
        }))
    }
    .await;
    respond(StatusCode::OK, result)
}

pub async fn ticket_conversation_inner(
    state: &HttpState,
    token: Option<&str>,
    ticket_id: &str,
) -> (StatusCode, serde_json::Value) {
    let result = async {
        let session = authenticate(state, token).await?;
        check_ticket(ticket_id)?;
        state.desk.ticket_conversation(&session, ticket_id).await
    }
    .await;
    respond(StatusCode::OK, result)
}

pub async fn agent_reply_inner(
    state: &HttpState,
    token: Option<&str>,
    ticket_id: &str,
    req: MessageRequest,
) -> (StatusCode, serde_json::Value) {
    let result = async {
        let session = authenticate(state, token).await?;
        check_ticket(ticket_id)?;
        let lead = state.desk.lead_by_ticket(ticket_id).await?;
        state
            .desk
            .append_agent_message(
                lead.id,
                session.agent_id,
                req.message.as_deref().unwrap_or_default(),
            )
            .await
    }
    .await;
    respond(StatusCode::CREATED, result)
}

pub async fn update_status_inner(
    state: &HttpState,
    token: Option<&str>,
    ticket_id: &str,
    req: StatusRequest,
) -> (StatusCode, serde_json::Value) {
    let result = async {
        let session = authenticate(state, token).await?;
        check_ticket(ticket_id)?;
        let status = req
            .status
            .as_deref()
            .and_then(LeadStatus::parse)
            .ok_or_else(|| LeadDeskError::validation("status must be resolved or unresolved"))?;
        let lead = state.desk.lead_by_ticket(ticket_id).await?;
        state
            .desk
            .update_status(lead.id, session.agent_id, status)
            .await
    }
    .await;
    respond(StatusCode::OK, result)
}

pub async fn assignees_inner(
    state: &HttpState,
    token: Option<&str>,
    ticket_id: &str,
) -> (StatusCode, serde_json::Value) {
    let result = async {
        authenticate(state, token).await?;
        check_ticket(ticket_id)?;
        let lead = state.desk.lead_by_ticket(ticket_id).await?;
        state.desk.assignable_agents(lead.id).await
    }
    .await;
    respond(StatusCode::OK, result)
}

pub async fn assign_inner(
    state: &HttpState,
    token: Option<&str>,
    ticket_id: &str,
    req: AssignRequest,
) -> (StatusCode, serde_json::Value) {
    let result = async {
        let session = authenticate(state, token).await?;
        check_ticket(ticket_id)?;
        let target = req
            .agent_id
            .ok_or_else(|| LeadDeskError::validation("agent_id is required"))?;
        let lead = state.desk.lead_by_ticket(ticket_id).await?;
        state.desk.assign(lead.id, session.agent_id, target).await
    }
    .await;
    respond(StatusCode::OK, result)
}

pub async fn list_agents_inner(state: &HttpState, token: Option<&str>) -> (StatusCode, serde_json::Value) {
    let result = async {
        authenticate(state, token).await?;
        state.desk.list_agents().await
    }
    .await;
    respond(StatusCode::OK, result)
}

/// Without a token this only succeeds while no owner exists.
pub async fn register_agent_inner(
    state: &HttpState,
    token: Option<&str>,
    draft: NewAgent,
) -> (StatusCode, serde_json::Value) {
    let result = async {
        let session = match token {
            Some(_) => Some(authenticate(state, token).await?),
            None => None,
        };
        state.desk.register_agent(session.as_ref(), &draft).await
    }
    .await;
    respond(StatusCode::CREATED, result)
}

pub async fn agent_details_inner(
    state: &HttpState,
    token: Option<&str>,
    agent_id: &str,
) -> (StatusCode, serde_json::Value) {
    let result = async {
        authenticate(state, token).await?;
        let target = parse_id(agent_id, "agent id")?;
        state.desk.agent_details(target).await
    }
    .await;
    respond(StatusCode::OK, result)
}

/// Owner edits anyone; members only themselves.
pub async fn update_agent_inner(
    state: &HttpState,
    token: Option<&str>,
    agent_id: &str,
    draft: NewAgent,
) -> (StatusCode, serde_json::Value) {
    let result = async {
        let session = authenticate(state, token).await?;
        let target = parse_id(agent_id, "agent id")?;
        state.desk.update_agent(&session, target, &draft).await
    }
    .await;
    respond(StatusCode::OK, result)
}

pub async fn remove_agent_inner(
    state: &HttpState,
    token: Option<&str>,
    agent_id: &str,
) -> (StatusCode, serde_json::Value) {
    let result = async {
        let session = authenticate(state, token).await?;
        let target = parse_id(agent_id, "agent id")?;
        state.desk.remove_agent(session.agent_id, target).await
    }
    .await;
    respond(StatusCode::OK, result)
}

pub async fn settings_inner(desk: &LeadDesk) -> (StatusCode, serde_json::Value) {
    respond(StatusCode::OK, desk.chat_settings().await)
}

pub async fn update_settings_inner(
    state: &HttpState,
    token: Option<&str>,
    req: SettingsRequest,
) -> (StatusCode, serde_json::Value) {
    let result = async {
        let session = authenticate(state, token).await?;
        state
            .desk
            .update_chat_settings(session.agent_id, req.missed_chat_timer)
            .await
    }
    .await;
    respond(StatusCode::OK, result)
}

pub async fn analytics_inner(state: &HttpState, token: Option<&str>) -> (StatusCode, serde_json::Value) {
    let result = async {
        authenticate(state, token).await?;
        state.desk.analytics().await
    }
    .await;
    respond(StatusCode::OK, result)
}

pub async fn sweep_inner(state: &HttpState, token: Option<&str>) -> (StatusCode, serde_json::Value) {
    let result = async {
        let session = authenticate(state, token).await?;
        state.desk.sweep_missed_chats_for(session.agent_id).await
    }
    .await;
    respond(StatusCode::OK, result)
}

// ============================================================================
// Axum handler wrappers
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.desk).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn create_lead_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<MessageRequest>,
) -> impl IntoResponse {
    let (status, body) = create_lead_inner(&state.desk, req).await;
    (status, Json(body))
}

pub async fn contact_view_handler(
    State(state): State<Arc<HttpState>>,
    Path(lead_id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = contact_view_inner(&state.desk, &lead_id).await;
    (status, Json(body))
}

pub async fn contact_message_handler(
    State(state): State<Arc<HttpState>>,
    Path(lead_id): Path<String>,
    Json(req): Json<MessageRequest>,
) -> impl IntoResponse {
    let (status, body) = contact_message_inner(&state.desk, &lead_id, req).await;
    (status, Json(body))
}

pub async fn contact_details_handler(
    State(state): State<Arc<HttpState>>,
    Path(lead_id): Path<String>,
    Json(req): Json<ContactDetailsRequest>,
) -> impl IntoResponse {
    let (status, body) = contact_details_inner(&state.desk, &lead_id, req).await;
    (status, Json(body))
}

pub async fn list_tickets_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Query(query): Query<TicketQuery>,
) -> impl IntoResponse {
    let (status, body) = list_tickets_inner(&state, bearer_token(&headers), query).await;
    (status, Json(body))
}

pub async fn ticket_conversation_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Path(ticket_id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = ticket_conversation_inner(&state, bearer_token(&headers), &ticket_id).await;
    (status, Json(body))
}

pub async fn agent_reply_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Path(ticket_id): Path<String>,
    Json(req): Json<MessageRequest>,
) -> impl IntoResponse {
    let (status, body) = agent_reply_inner(&state, bearer_token(&headers), &ticket_id, req).await;
    (status, Json(body))
}

pub async fn update_status_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Path(ticket_id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> impl IntoResponse {
    let (status, body) = update_status_inner(&state, bearer_token(&headers), &ticket_id, req).await;
    (status, Json(body))
}

pub async fn assignees_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Path(ticket_id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = assignees_inner(&state, bearer_token(&headers), &ticket_id).await;
    (status, Json(body))
}

pub async fn assign_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Path(ticket_id): Path<String>,
    Json(req): Json<AssignRequest>,
) -> impl IntoResponse {
    let (status, body) = assign_inner(&state, bearer_token(&headers), &ticket_id, req).await;
    (status, Json(body))
}

pub async fn list_agents_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (status, body) = list_agents_inner(&state, bearer_token(&headers)).await;
    (status, Json(body))
}

pub async fn register_agent_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Json(draft): Json<NewAgent>,
) -> impl IntoResponse {
    let (status, body) = register_agent_inner(&state, bearer_token(&headers), draft).await;
    (status, Json(body))
}

pub async fn agent_details_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Path(agent_id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = agent_details_inner(&state, bearer_token(&headers), &agent_id).await;
    (status, Json(body))
}

pub async fn update_agent_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Path(agent_id): Path<String>,
    Json(draft): Json<NewAgent>,
) -> impl IntoResponse {
    let (status, body) = update_agent_inner(&state, bearer_token(&headers), &agent_id, draft).await;
    (status, Json(body))
}

pub async fn remove_agent_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Path(agent_id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = remove_agent_inner(&state, bearer_token(&headers), &agent_id).await;
    (status, Json(body))
}

pub async fn settings_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = settings_inner(&state.desk).await;
    (status, Json(body))
}

pub async fn update_settings_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Json(req): Json<SettingsRequest>,
) -> impl IntoResponse {
    let (status, body) = update_settings_inner(&state, bearer_token(&headers), req).await;
    (status, Json(body))
}

pub async fn analytics_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (status, body) = analytics_inner(&state, bearer_token(&headers)).await;
    (status, Json(body))
}

pub async fn sweep_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (status, body) = sweep_inner(&state, bearer_token(&headers)).await;
    (status, Json(body))
}

// ============================================================================
// Unit Tests
// ============================================================================
