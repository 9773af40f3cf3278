//! HTTP API handlers for AquaMon.
//!
//! Thin layer over the engine: handlers validate input, attach the
//! current wall-clock time, translate [`EngineError`] variants into
//! HTTP statuses, and log outcomes. All domain decisions live in
//! [`crate::policy`] and [`crate::engine`]. User-facing presentation
//! (toasts, prompts) is the frontend's concern; the API only guarantees
//! that the discriminated failure reason reaches it.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::engine;
use crate::error::EngineError;
use crate::fill;
use crate::forecast::{Prediction, PredictorClient};
use crate::model::{
    ActorRequest, Alert, AlertsQuery, CreateFillRequest, DashboardStats, FillRequest,
    FillRequestsQuery, SetLevelRequest, SetValveRequest, Tank, Truck, TruckStatusRequest,
};
use crate::storage::Storage;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,

    /// External consumption predictor; `None` when not configured.
    pub predictor: Option<PredictorClient>,
}

/// Error shape returned by every failing endpoint.
type ApiError = (StatusCode, Json<Value>);

fn engine_error_response(err: EngineError) -> ApiError {
    let (status, body) = match &err {
        EngineError::Precondition { reason } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "error": "precondition_failed", "reason": reason.as_str() }),
        ),
        EngineError::NotFound { what, id } => (
            StatusCode::NOT_FOUND,
            json!({ "error": "not_found", "what": what, "id": id }),
        ),
        EngineError::AlreadyProcessed { what, id } => (
            StatusCode::CONFLICT,
            json!({ "error": "already_processed", "what": what, "id": id }),
        ),
        EngineError::InvalidTransition { what, id } => (
            StatusCode::CONFLICT,
            json!({ "error": "invalid_transition", "what": what, "id": id }),
        ),
        EngineError::DependencyTimeout(dependency) => (
            StatusCode::GATEWAY_TIMEOUT,
            json!({ "error": "dependency_timeout", "dependency": dependency }),
        ),
        EngineError::Dependency(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "internal" }),
        ),
    };

    warn!(error = %err, "Request failed");
    (status, Json(body))
}

fn bad_request(message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "invalid_request", "message": message })),
    )
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/tanks", get(list_tanks))
        .route("/tanks/:id", get(get_tank))
        .route("/tanks/:id/level", put(set_tank_level))
        .route("/tanks/:id/valve", put(set_tank_valve))
        .route("/alerts", get(get_alerts))
        .route("/alerts/evaluate", post(evaluate_alerts))
        .route("/alerts/:id/resolve", post(resolve_alert))
        .route("/alerts/reactivation-check", post(check_reactivations))
        .route("/fill-requests", post(create_fill_request).get(list_fill_requests))
        .route("/fill-requests/:id/approve", post(approve_fill_request))
        .route("/fill-requests/:id/reject", post(reject_fill_request))
        .route("/trucks", get(list_trucks))
        .route("/trucks/:id/status", put(set_truck_status))
        .route("/dashboard/stats", get(get_dashboard_stats))
        .route("/forecast", get(get_forecast))
        .with_state(state)
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// GET /tanks - All tanks, cistern first.
#[instrument(skip(state))]
pub async fn list_tanks(State(state): State<AppState>) -> Result<Json<Vec<Tank>>, ApiError> {
    let tanks = state
        .storage
        .list_tanks()
        .await
        .map_err(|e| engine_error_response(e.into()))?;

    Ok(Json(tanks))
}

/// GET /tanks/:id - One tank snapshot.
#[instrument(skip(state))]
pub async fn get_tank(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Tank>, ApiError> {
    let tank = state
        .storage
        .get_tank(&id)
        .await
        .map_err(|e| engine_error_response(e.into()))?
        .ok_or_else(|| engine_error_response(EngineError::not_found("tank", &id)))?;

    Ok(Json(tank))
}

/// PUT /tanks/:id/level - Admin write path for a new level reading.
///
/// The level is validated to `0..=100` before it reaches storage.
#[instrument(skip(state, request), fields(level = request.level))]
pub async fn set_tank_level(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SetLevelRequest>,
) -> Result<Json<Tank>, ApiError> {
    if !request.level.is_finite() || !(0.0..=100.0).contains(&request.level) {
        return Err(bad_request("level must be between 0 and 100"));
    }

    let updated = state
        .storage
        .set_level(&id, request.level, Utc::now())
        .await
        .map_err(|e| engine_error_response(e.into()))?;
    if !updated {
        return Err(engine_error_response(EngineError::not_found("tank", &id)));
    }

    info!(tank_id = %id, level = request.level, "Tank level updated");
    get_tank(State(state), Path(id)).await
}

/// PUT /tanks/:id/valve - Open or close a tank's inflow valve.
#[instrument(skip(state, request), fields(status = request.status.as_str()))]
pub async fn set_tank_valve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SetValveRequest>,
) -> Result<Json<Tank>, ApiError> {
    let updated = state
        .storage
        .set_valve_status(&id, request.status)
        .await
        .map_err(|e| engine_error_response(e.into()))?;
    if !updated {
        return Err(engine_error_response(EngineError::not_found("tank", &id)));
    }

    info!(tank_id = %id, status = request.status.as_str(), "Valve status updated");
    get_tank(State(state), Path(id)).await
}

/// GET /alerts - Alert history, newest first.
///
/// # Query Parameters
///
/// - `active` (optional): when true, only open alerts are returned.
#[instrument(skip(state))]
pub async fn get_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> Result<Json<Vec<Alert>>, ApiError> {
    let alerts = state
        .storage
        .list_alerts(query.active.unwrap_or(false))
        .await
        .map_err(|e| engine_error_response(e.into()))?;

    Ok(Json(alerts))
}

/// POST /alerts/evaluate - Run the evaluation sweep over every tank.
///
/// Returns one entry per tank with the action taken (`raised`,
/// `escalated`, or `noop`). Intended to run after each data refresh.
#[instrument(skip(state))]
pub async fn evaluate_alerts(
    State(state): State<AppState>,
) -> Result<Json<Vec<engine::TankEvaluation>>, ApiError> {
    let results = engine::evaluate_all_tanks(&state.storage, Utc::now())
        .await
        .map_err(engine_error_response)?;

    let raised = results
        .iter()
        .filter(|r| !matches!(r.outcome, engine::EvaluationOutcome::Noop))
        .count();
    info!(tanks = results.len(), changed = raised, "Evaluation sweep completed");

    Ok(Json(results))
}

/// POST /alerts/:id/resolve - Resolve an open alert.
///
/// Fails with 422 and a discriminated `reason` (`valve_closed` or
/// `level_low`) when the preconditions are not met, so the frontend can
/// surface the correct remediation prompt.
#[instrument(skip(state, request), fields(actor = %request.actor))]
pub async fn resolve_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ActorRequest>,
) -> Result<Json<Alert>, ApiError> {
    let alert = engine::resolve_alert(&state.storage, &id, &request.actor, Utc::now())
        .await
        .map_err(engine_error_response)?;

    info!(
        alert_id = %alert.id,
        tank_id = %alert.tank_id,
        actor = %request.actor,
        level = alert.level_at_resolve,
        "Alert resolved"
    );

    Ok(Json(alert))
}

/// POST /alerts/reactivation-check - Run the post-resolution sweep.
///
/// Safe to call at any frequency; the check is idempotent.
#[instrument(skip(state))]
pub async fn check_reactivations(
    State(state): State<AppState>,
) -> Result<Json<Vec<engine::AlertReactivation>>, ApiError> {
    let results = engine::check_all_reactivations(&state.storage, Utc::now())
        .await
        .map_err(engine_error_response)?;

    let reactivated = results
        .iter()
        .filter(|r| matches!(r.outcome, engine::ReactivationOutcome::Reactivated { .. }))
        .count();
    info!(
        checked = results.len(),
        reactivated, "Reactivation sweep completed"
    );

    Ok(Json(results))
}

/// POST /fill-requests - Create (or return the existing) pending fill
/// request for a tank.
#[instrument(skip(state, request), fields(tank_id = %request.tank_id))]
pub async fn create_fill_request(
    State(state): State<AppState>,
    Json(request): Json<CreateFillRequest>,
) -> Result<Json<FillRequest>, ApiError> {
    if !request.requested_level.is_finite() || !(0.0..=100.0).contains(&request.requested_level) {
        return Err(bad_request("requested_level must be between 0 and 100"));
    }

    let fill_request = fill::request_fill(
        &state.storage,
        &request.tank_id,
        request.requested_level,
        Utc::now(),
    )
    .await
    .map_err(engine_error_response)?;

    info!(
        request_id = %fill_request.id,
        tank_id = %fill_request.tank_id,
        "Fill request created or reused"
    );

    Ok(Json(fill_request))
}

/// GET /fill-requests - Fill requests, newest first.
#[instrument(skip(state))]
pub async fn list_fill_requests(
    State(state): State<AppState>,
    Query(query): Query<FillRequestsQuery>,
) -> Result<Json<Vec<FillRequest>>, ApiError> {
    let requests = state
        .storage
        .list_fill_requests(query.status)
        .await
        .map_err(|e| engine_error_response(e.into()))?;

    Ok(Json(requests))
}

/// POST /fill-requests/:id/approve - Approve a pending request and open
/// the tank's valve. The actor is recorded in the request log only.
#[instrument(skip(state, request), fields(actor = %request.actor))]
pub async fn approve_fill_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ActorRequest>,
) -> Result<Json<FillRequest>, ApiError> {
    let approved = fill::approve_fill(&state.storage, &id, Utc::now())
        .await
        .map_err(engine_error_response)?;

    info!(
        request_id = %approved.id,
        tank_id = %approved.tank_id,
        actor = %request.actor,
        "Fill request approved, valve opening"
    );

    Ok(Json(approved))
}

/// POST /fill-requests/:id/reject - Reject a pending request.
#[instrument(skip(state, request), fields(actor = %request.actor))]
pub async fn reject_fill_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ActorRequest>,
) -> Result<Json<FillRequest>, ApiError> {
    let rejected = fill::reject_fill(&state.storage, &id)
        .await
        .map_err(engine_error_response)?;

    info!(
        request_id = %rejected.id,
        tank_id = %rejected.tank_id,
        actor = %request.actor,
        "Fill request rejected"
    );

    Ok(Json(rejected))
}

/// GET /trucks - Delivery schedule, earliest arrival first.
#[instrument(skip(state))]
pub async fn list_trucks(State(state): State<AppState>) -> Result<Json<Vec<Truck>>, ApiError> {
    let trucks = state
        .storage
        .list_trucks()
        .await
        .map_err(|e| engine_error_response(e.into()))?;

    Ok(Json(trucks))
}

/// PUT /trucks/:id/status - Advance a delivery through its lifecycle.
///
/// Transitions only move forward (`scheduled` to `arrived` to
/// `delivered`); anything else is a 409.
#[instrument(skip(state, request), fields(status = request.status.as_str()))]
pub async fn set_truck_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<TruckStatusRequest>,
) -> Result<Json<Truck>, ApiError> {
    let truck = state
        .storage
        .get_truck(&id)
        .await
        .map_err(|e| engine_error_response(e.into()))?
        .ok_or_else(|| engine_error_response(EngineError::not_found("truck", &id)))?;

    if !truck.status.can_advance_to(request.status) {
        return Err(engine_error_response(EngineError::InvalidTransition {
            what: "truck",
            id,
        }));
    }

    state
        .storage
        .set_truck_status(&id, request.status)
        .await
        .map_err(|e| engine_error_response(e.into()))?;

    info!(truck_id = %id, status = request.status.as_str(), "Truck status updated");

    let truck = state
        .storage
        .get_truck(&id)
        .await
        .map_err(|e| engine_error_response(e.into()))?
        .ok_or_else(|| engine_error_response(EngineError::not_found("truck", &id)))?;

    Ok(Json(truck))
}

/// GET /dashboard/stats - Building-wide statistics for the dashboard.
#[instrument(skip(state))]
pub async fn get_dashboard_stats(
    State(state): State<AppState>,
) -> Result<Json<DashboardStats>, ApiError> {
    let stats = engine::dashboard_stats(&state.storage, Utc::now())
        .await
        .map_err(engine_error_response)?;

    Ok(Json(stats))
}

/// GET /forecast - Proxy the external consumption predictor.
///
/// Returns 503 when no predictor is configured, 504 when it times out.
#[instrument(skip(state))]
pub async fn get_forecast(State(state): State<AppState>) -> Result<Json<Prediction>, ApiError> {
    let predictor = state.predictor.as_ref().ok_or_else(|| {
        warn!("Predictor not configured");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "predictor_not_configured" })),
        )
    })?;

    let prediction = predictor.predict().await.map_err(engine_error_response)?;

    info!(
        predicted_consumption = prediction.predicted_consumption,
        confidence = prediction.confidence,
        "Forecast fetched"
    );

    Ok(Json(prediction))
}
