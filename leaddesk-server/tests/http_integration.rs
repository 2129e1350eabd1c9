//! HTTP integration tests for the LeadDesk REST API
//!
//! The router is driven with `tower::ServiceExt::oneshot` over an in-memory
//! store, so no database or network is needed.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use leaddesk_core::store::SettingsStore;
use leaddesk_core::{Clock, LeadDeskConfig, ManualClock, MemoryStore, SignedTokenVerifier};
use leaddesk_server::http::{build_router, health_inner, version_inner};
use leaddesk_server::{build_state, HttpState};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    state: Arc<HttpState>,
    tokens: SignedTokenVerifier,
}

impl TestApp {
    fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    fn token_for(&self, agent_id: &str) -> String {
        let id = Uuid::parse_str(agent_id).unwrap();
        self.tokens.issue(id).unwrap()
    }

    async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }
}

async fn make_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    store.ensure_default_settings().await.unwrap();
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
    ));
    let config = LeadDeskConfig::default();

    let tokens = SignedTokenVerifier::new(
        config.service.token_secret.clone(),
        config.service.token_ttl_seconds,
        store.clone(),
        clock.clone(),
    )
    .unwrap();
    let state = Arc::new(build_state(store, clock, &config).unwrap());
    TestApp { state, tokens }
}

/// Registers the owner and one member; returns their ids.
async fn seed_agents(app: &TestApp) -> (String, String) {
    let (status, owner) = app
        .send(
            "POST",
            "/agents",
            None,
            Some(json!({"first_name": "Olive", "last_name": "Owner", "email": "olive@example.com"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{owner}");
    let owner_id = owner["id"].as_str().unwrap().to_string();

    let owner_token = app.token_for(&owner_id);
    let (status, member) = app
        .send(
            "POST",
            "/agents",
            Some(&owner_token),
            Some(json!({"first_name": "Mia", "last_name": "Member", "email": "mia@example.com"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{member}");
    (owner_id, member["id"].as_str().unwrap().to_string())
}

// ===========================================================================
// TEST 1: health and version
// ===========================================================================
#[tokio::test]
async fn test_health_and_version() {
    let app = make_app().await;

    let (status, body) = health_inner(&app.state.desk).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    let (status, body) = app.send("GET", "/version", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, version_inner());
}

// ===========================================================================
// TEST 2: bootstrap creates the owner once; later creation needs the owner
// ===========================================================================
#[tokio::test]
async fn test_agent_bootstrap_and_authorization() {
    let app = make_app().await;
    let (owner_id, member_id) = seed_agents(&app).await;

    let (status, body) = app
        .send(
            "POST",
            "/agents",
            None,
            Some(json!({"first_name": "Eve", "last_name": "X", "email": "eve@example.com"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let member_token = app.token_for(&member_id);
    let (status, body) = app
        .send(
            "POST",
            "/agents",
            Some(&member_token),
            Some(json!({"first_name": "Eve", "last_name": "X", "email": "eve@example.com"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let owner_token = app.token_for(&owner_id);
    let (status, body) = app
        .send(
            "POST",
            "/agents",
            Some(&owner_token),
            Some(json!({"first_name": "Mia", "last_name": "Again", "email": "MIA@example.com"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, body) = app.send("GET", "/agents", Some(&member_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
}

// ===========================================================================
// TEST 3: contact flow: open, view, message, details
// ===========================================================================
#[tokio::test]
async fn test_contact_flow() {
    let app = make_app().await;
    seed_agents(&app).await;

    let (status, created) = app
        .send("POST", "/leads", None, Some(json!({"message": "Hi, I need a quote"})))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["ticket_id"], "2026-0302");
    let lead_id = created["lead_id"].as_str().unwrap().to_string();

    let (status, _) = app
        .send(
            "PUT",
            &format!("/leads/{lead_id}"),
            None,
            Some(json!({"message": "Are you there?"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, view) = app
        .send(
            "POST",
            &format!("/leads/{lead_id}/details"),
            None,
            Some(json!({"name": " Ana ", "email": "ana@example.com", "phone": "555"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{view}");
    assert_eq!(view["contact_name"], "Ana");
    assert_eq!(view["is_detail_shared"], true);
    assert_eq!(view["conversation"].as_array().unwrap().len(), 2);

    let (status, body) = app
        .send(
            "POST",
            &format!("/leads/{lead_id}/details"),
            None,
            Some(json!({"name": "Ana", "email": "ana@example.com"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_failed");

    let (status, _) = app
        .send("POST", "/leads", None, Some(json!({"message": "   "})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ===========================================================================
// TEST 4: lookups map to 400 / 404
// ===========================================================================
#[tokio::test]
async fn test_bad_and_unknown_ids() {
    let app = make_app().await;
    let (owner_id, _) = seed_agents(&app).await;
    let token = app.token_for(&owner_id);

    let (status, body) = app
        .send("GET", &format!("/leads/{}", Uuid::new_v4()), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = app.send("GET", "/leads/not-a-uuid", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.send("GET", "/tickets/20260302", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.send("GET", "/tickets/2026-0302", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ===========================================================================
// TEST 5: agent endpoints require a valid bearer token
// ===========================================================================
#[tokio::test]
async fn test_ticket_endpoints_require_auth() {
    let app = make_app().await;
    seed_agents(&app).await;

    let (status, body) = app.send("GET", "/tickets", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = app.send("GET", "/tickets", Some("forged.token.value"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send("GET", "/analytics", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ===========================================================================
// TEST 6: agent workflow: list, reply, reassign, status
// ===========================================================================
#[tokio::test]
async fn test_agent_ticket_workflow() {
    let app = make_app().await;
    let (owner_id, member_id) = seed_agents(&app).await;
    let owner_token = app.token_for(&owner_id);
    let member_token = app.token_for(&member_id);

    let (_, created) = app
        .send("POST", "/leads", None, Some(json!({"message": "hello"})))
        .await;
    let ticket = created["ticket_id"].as_str().unwrap().to_string();

    let (status, list) = app.send("GET", "/tickets", Some(&owner_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 1);
    assert_eq!(list["leads"][0]["latest_message"], "hello");

    let (status, list) = app.send("GET", "/tickets?status=resolved", Some(&owner_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 0);

    let (status, list) = app.send("GET", "/tickets", Some(&member_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 0);

    // member cannot reply to, reassign or read a lead it never held
    let (status, _) = app
        .send("PUT", &format!("/tickets/{ticket}"), Some(&member_token), Some(json!({"message": "hi"})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .send(
            "PUT",
            &format!("/tickets/{ticket}/assignee"),
            Some(&member_token),
            Some(json!({"agent_id": member_id})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.send("GET", &format!("/tickets/{ticket}"), Some(&member_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, candidates) = app
        .send("GET", &format!("/tickets/{ticket}/assignees"), Some(&owner_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(candidates[0]["agent_id"], member_id.as_str());

    let (status, lead) = app
        .send(
            "PUT",
            &format!("/tickets/{ticket}/assignee"),
            Some(&owner_token),
            Some(json!({"agent_id": member_id})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{lead}");
    assert_eq!(lead["current_assignee"], member_id.as_str());

    let (status, reply) = app
        .send("PUT", &format!("/tickets/{ticket}"), Some(&member_token), Some(json!({"message": "on it"})))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{reply}");
    assert_eq!(reply["first_response"], true);

    let (status, conversation) = app
        .send("GET", &format!("/tickets/{ticket}"), Some(&member_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(conversation["messages"][1]["sender_name"], "Mia Member");

    let (status, lead) = app
        .send(
            "PUT",
            &format!("/tickets/{ticket}/status"),
            Some(&member_token),
            Some(json!({"status": "resolved"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lead["status"], "resolved");

    let (status, report) = app.send("GET", "/analytics", Some(&member_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["total_leads"], 1);
    assert_eq!(report["resolved_percentage"], 100);
}

// ===========================================================================
// TEST 7: agent removal rules over HTTP
// ===========================================================================
#[tokio::test]
async fn test_remove_agent_endpoint() {
    let app = make_app().await;
    let (owner_id, member_id) = seed_agents(&app).await;
    let owner_token = app.token_for(&owner_id);
    let member_token = app.token_for(&member_id);

    let (status, body) = app
        .send("DELETE", &format!("/agents/{owner_id}"), Some(&owner_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, _) = app
        .send("DELETE", &format!("/agents/{owner_id}"), Some(&member_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, report) = app
        .send("DELETE", &format!("/agents/{member_id}"), Some(&owner_token), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(report["leads_reassigned"], 0);

    // the deleted member's token is dead
    let (status, _) = app.send("GET", "/tickets", Some(&member_token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send("DELETE", &format!("/agents/{}", Uuid::new_v4()), Some(&owner_token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ===========================================================================
// TEST 8: settings and manual sweep
// ===========================================================================
#[tokio::test]
async fn test_settings_and_sweep_endpoints() {
    let app = make_app().await;
    let (owner_id, member_id) = seed_agents(&app).await;
    let owner_token = app.token_for(&owner_id);
    let member_token = app.token_for(&member_id);

    let (status, settings) = app.send("GET", "/settings", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settings["missed_chat_timer"]["hour"], 1);

    let bad = json!({"missed_chat_timer": {"hour": 0, "minute": 75, "second": 0}});
    let (status, _) = app.send("PUT", "/settings", Some(&owner_token), Some(bad)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let good = json!({"missed_chat_timer": {"hour": 0, "minute": 5, "second": 0}});
    let (status, _) = app
        .send("PUT", "/settings", Some(&member_token), Some(good.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, saved) = app.send("PUT", "/settings", Some(&owner_token), Some(good)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["missed_chat_timer"]["minute"], 5);

    let (status, _) = app.send("POST", "/sla/sweep", Some(&member_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, report) = app.send("POST", "/sla/sweep", Some(&owner_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["flagged"], 0);
    assert_eq!(report["threshold_seconds"], 300);
    assert_eq!(report["skipped"], false);
}

// ===========================================================================
// TEST 9: agent details can be read by any agent and edited by self or owner
// ===========================================================================
#[tokio::test]
async fn test_agent_details_read_and_edit() {
    let app = make_app().await;
    let (owner_id, member_id) = seed_agents(&app).await;
    let owner_token = app.token_for(&owner_id);
    let member_token = app.token_for(&member_id);

    let (status, _) = app.send("GET", &format!("/agents/{member_id}"), None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, details) = app
        .send("GET", &format!("/agents/{member_id}"), Some(&member_token), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{details}");
    assert_eq!(details["email"], "mia@example.com");
    assert_eq!(details["role"], "member");

    // members edit themselves, trimmed
    let edit = json!({
        "first_name": " Mia ",
        "last_name": "Moreno",
        "email": " Mia.Moreno@Example.com ",
        "phone": " 555-0100 "
    });
    let (status, updated) = app
        .send("PUT", &format!("/agents/{member_id}"), Some(&member_token), Some(edit))
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["first_name"], "Mia");
    assert_eq!(updated["last_name"], "Moreno");
    assert_eq!(updated["email"], "mia.moreno@example.com");
    assert_eq!(updated["phone"], "555-0100");
    assert_eq!(updated["role"], "member");

    // but not the owner
    let hijack = json!({"first_name": "Olive", "last_name": "Owner", "email": "mine@example.com"});
    let (status, _) = app
        .send("PUT", &format!("/agents/{owner_id}"), Some(&member_token), Some(hijack))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // the owner edits anyone, but emails stay unique
    let taken = json!({"first_name": "Mia", "last_name": "Moreno", "email": "OLIVE@example.com"});
    let (status, body) = app
        .send("PUT", &format!("/agents/{member_id}"), Some(&owner_token), Some(taken))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let blank = json!({"first_name": " ", "last_name": "Moreno", "email": "mia@example.com"});
    let (status, _) = app
        .send("PUT", &format!("/agents/{member_id}"), Some(&owner_token), Some(blank))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send("GET", &format!("/agents/{}", Uuid::new_v4()), Some(&owner_token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.send("GET", "/agents/not-a-uuid", Some(&owner_token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
