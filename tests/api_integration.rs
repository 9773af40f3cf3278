//! Integration tests for AquaMon API endpoints.
//!
//! These tests verify the full request/response cycle through the HTTP
//! API, including the discriminated precondition reasons the frontend
//! depends on. Time-window behavior (24h/48h reactivation) is covered
//! by the engine unit tests with fixed clocks; here the sweeps run
//! against the real clock, so only their same-instant behavior is
//! asserted.

use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::Utc;
use serde_json::json;

use aquamon::api::{AppState, router};
use aquamon::model::{Tank, Truck, TruckStatus, ValveStatus};
use aquamon::storage::Storage;

async fn create_test_server() -> (TestServer, Storage) {
    let storage = Storage::new("sqlite::memory:").await.unwrap();
    let state = AppState {
        storage: storage.clone(),
        predictor: None, // Predictor not needed for core API tests
    };

    (TestServer::new(router(state)).unwrap(), storage)
}

async fn seed_tank(storage: &Storage, id: &str, level: f64, valve: ValveStatus) {
    storage
        .insert_tank(&Tank {
            id: id.to_string(),
            floor: 3,
            room_number: None,
            level,
            capacity_liters: 3000,
            valve_status: valve,
            last_updated: Utc::now(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_health_endpoint() {
    let (server, _storage) = create_test_server().await;

    server.get("/health").await.assert_status_ok();
}

#[tokio::test]
async fn test_list_and_get_tanks() {
    let (server, storage) = create_test_server().await;
    seed_tank(&storage, "tank-1", 75.0, ValveStatus::Closed).await;

    let response = server.get("/tanks").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body.as_array().unwrap().len(), 1);

    let response = server.get("/tanks/tank-1").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["level"], 75.0);
    assert_eq!(body["valve_status"], "closed");

    server.get("/tanks/missing").await.assert_status_not_found();
}

#[tokio::test]
async fn test_set_level_validation() {
    let (server, storage) = create_test_server().await;
    seed_tank(&storage, "tank-1", 75.0, ValveStatus::Closed).await;

    let response = server
        .put("/tanks/tank-1/level")
        .json(&json!({ "level": 150.0 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .put("/tanks/missing/level")
        .json(&json!({ "level": 50.0 }))
        .await;
    response.assert_status_not_found();

    let response = server
        .put("/tanks/tank-1/level")
        .json(&json!({ "level": 42.5 }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["level"], 42.5);
}

#[tokio::test]
async fn test_alert_lifecycle_with_discriminated_preconditions() {
    let (server, storage) = create_test_server().await;
    seed_tank(&storage, "tank-1", 10.0, ValveStatus::Closed).await;

    // Evaluation raises a critical alert.
    let response = server.post("/alerts/evaluate").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body[0]["action"], "raised");
    assert_eq!(body[0]["severity"], "critical");
    let alert_id = body[0]["alert_id"].as_str().unwrap().to_string();

    // Open alerts are visible through the active filter.
    let response = server.get("/alerts?active=true").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["is_resolved"], false);

    // Valve closed blocks resolution, and the reason says so.
    let response = server
        .post(&format!("/alerts/{alert_id}/resolve"))
        .json(&json!({ "actor": "admin" }))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = response.json();
    assert_eq!(body["reason"], "valve_closed");

    // Valve open but the level is still short of 50%.
    server
        .put("/tanks/tank-1/valve")
        .json(&json!({ "status": "open" }))
        .await
        .assert_status_ok();
    let response = server
        .post(&format!("/alerts/{alert_id}/resolve"))
        .json(&json!({ "actor": "admin" }))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = response.json();
    assert_eq!(body["reason"], "level_low");

    // Both preconditions met: resolution succeeds.
    server
        .put("/tanks/tank-1/level")
        .json(&json!({ "level": 62.0 }))
        .await
        .assert_status_ok();
    let response = server
        .post(&format!("/alerts/{alert_id}/resolve"))
        .json(&json!({ "actor": "admin" }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["is_resolved"], true);
    assert_eq!(body["resolved_by"], "admin");
    assert_eq!(body["level_at_resolve"], 62.0);

    // Resolving again is a state-machine violation.
    let response = server
        .post(&format!("/alerts/{alert_id}/resolve"))
        .json(&json!({ "actor": "admin" }))
        .await;
    response.assert_status(StatusCode::CONFLICT);

    // A just-resolved alert is stable at the same instant.
    let response = server.post("/alerts/reactivation-check").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body[0]["decision"], "stable");
}

#[tokio::test]
async fn test_evaluation_escalates_existing_alert() {
    let (server, storage) = create_test_server().await;
    seed_tank(&storage, "tank-1", 20.0, ValveStatus::Closed).await;

    let response = server.post("/alerts/evaluate").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body[0]["action"], "raised");
    assert_eq!(body[0]["severity"], "low");
    let alert_id = body[0]["alert_id"].as_str().unwrap().to_string();

    server
        .put("/tanks/tank-1/level")
        .json(&json!({ "level": 9.0 }))
        .await
        .assert_status_ok();

    let response = server.post("/alerts/evaluate").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body[0]["action"], "escalated");
    assert_eq!(body[0]["alert_id"], alert_id.as_str());

    // Still exactly one open alert for the tank.
    let response = server.get("/alerts?active=true").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["severity"], "critical");
}

#[tokio::test]
async fn test_fill_request_workflow() {
    let (server, storage) = create_test_server().await;
    seed_tank(&storage, "tank-7", 12.0, ValveStatus::Closed).await;

    // Creating twice before approval returns the same pending request.
    let first = server
        .post("/fill-requests")
        .json(&json!({ "tank_id": "tank-7" }))
        .await;
    first.assert_status_ok();
    let first: serde_json::Value = first.json();
    assert_eq!(first["status"], "pending");
    assert_eq!(first["requested_level"], 100.0);

    let second = server
        .post("/fill-requests")
        .json(&json!({ "tank_id": "tank-7" }))
        .await;
    let second: serde_json::Value = second.json();
    assert_eq!(first["id"], second["id"]);

    let response = server.get("/fill-requests?status=pending").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body.as_array().unwrap().len(), 1);

    // Approval opens the valve.
    let request_id = first["id"].as_str().unwrap().to_string();
    let response = server
        .post(&format!("/fill-requests/{request_id}/approve"))
        .json(&json!({ "actor": "supervisor" }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "approved");

    let response = server.get("/tanks/tank-7").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["valve_status"], "open");

    // Approving an already-approved request is a 409.
    let response = server
        .post(&format!("/fill-requests/{request_id}/approve"))
        .json(&json!({ "actor": "supervisor" }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "already_processed");
}

#[tokio::test]
async fn test_fill_request_reject_and_unknowns() {
    let (server, storage) = create_test_server().await;
    seed_tank(&storage, "tank-7", 12.0, ValveStatus::Closed).await;

    let response = server
        .post("/fill-requests")
        .json(&json!({ "tank_id": "tank-99" }))
        .await;
    response.assert_status_not_found();

    let created = server
        .post("/fill-requests")
        .json(&json!({ "tank_id": "tank-7" }))
        .await;
    let created: serde_json::Value = created.json();
    let request_id = created["id"].as_str().unwrap().to_string();

    let response = server
        .post(&format!("/fill-requests/{request_id}/reject"))
        .json(&json!({ "actor": "supervisor" }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "rejected");

    // Rejection leaves the valve closed.
    let response = server.get("/tanks/tank-7").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["valve_status"], "closed");

    let response = server
        .post("/fill-requests/fill-missing/approve")
        .json(&json!({ "actor": "supervisor" }))
        .await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn test_truck_status_transitions() {
    let (server, storage) = create_test_server().await;
    let now = Utc::now();
    storage
        .insert_truck(&Truck {
            id: "truck-1".to_string(),
            truck_number: "T-42".to_string(),
            arrival_date: now + chrono::Duration::hours(4),
            water_delivered_liters: 10_000.0,
            status: TruckStatus::Scheduled,
            notes: None,
            created_at: now,
        })
        .await
        .unwrap();

    let response = server.get("/trucks").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body[0]["status"], "scheduled");

    let response = server
        .put("/trucks/truck-1/status")
        .json(&json!({ "status": "arrived" }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "arrived");

    // Deliveries never move backwards.
    let response = server
        .put("/trucks/truck-1/status")
        .json(&json!({ "status": "scheduled" }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_transition");
}

#[tokio::test]
async fn test_dashboard_stats() {
    let (server, storage) = create_test_server().await;
    seed_tank(&storage, "tank-1", 10.0, ValveStatus::Open).await;
    seed_tank(&storage, "tank-2", 90.0, ValveStatus::Closed).await;

    let response = server.get("/dashboard/stats").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["total_tanks"], 2);
    assert_eq!(body["average_level"], 50.0);
    assert_eq!(body["critical_tanks"], 1);
    assert_eq!(body["open_valves"], 1);
    assert_eq!(body["total_capacity_liters"], 6000);
    assert!(body["next_truck"].is_null());
}

#[tokio::test]
async fn test_forecast_unconfigured() {
    let (server, _storage) = create_test_server().await;

    let response = server.get("/forecast").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_full_workflow() {
    let (server, storage) = create_test_server().await;
    seed_tank(&storage, "tank-1", 8.0, ValveStatus::Closed).await;
    seed_tank(&storage, "tank-2", 80.0, ValveStatus::Closed).await;

    // 1. The sweep raises exactly one alert.
    server.post("/alerts/evaluate").await.assert_status_ok();
    let response = server.get("/alerts?active=true").await;
    let alerts: serde_json::Value = response.json();
    assert_eq!(alerts.as_array().unwrap().len(), 1);
    let alert_id = alerts[0]["id"].as_str().unwrap().to_string();

    // 2. The admin requests a fill and a supervisor approves it.
    let created = server
        .post("/fill-requests")
        .json(&json!({ "tank_id": "tank-1" }))
        .await;
    let created: serde_json::Value = created.json();
    let request_id = created["id"].as_str().unwrap().to_string();
    server
        .post(&format!("/fill-requests/{request_id}/approve"))
        .json(&json!({ "actor": "supervisor" }))
        .await
        .assert_status_ok();

    // 3. The tank fills past the resolve threshold (observed via a new
    //    level reading) and the alert can be resolved.
    server
        .put("/tanks/tank-1/level")
        .json(&json!({ "level": 55.0 }))
        .await
        .assert_status_ok();
    let response = server
        .post(&format!("/alerts/{alert_id}/resolve"))
        .json(&json!({ "actor": "admin" }))
        .await;
    response.assert_status_ok();

    // 4. No active alerts remain; history keeps the resolved one.
    let response = server.get("/alerts?active=true").await;
    let body: serde_json::Value = response.json();
    assert!(body.as_array().unwrap().is_empty());

    let response = server.get("/alerts").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body.as_array().unwrap().len(), 1);
}
