//! Fill request coordinator.
//!
//! Manages the request/approval handshake for opening a tank's valve in
//! response to an alert. A request is created when an administrator
//! decides to act on an alert whose tank valve is closed; a second
//! administrator approves or rejects it. Approval flips the tank's
//! valve to `open` as a delegated, fire-and-forget side effect; the
//! coordinator never waits for the fill itself, which is observed
//! through subsequent tank level readings.
//!
//! State machine: `pending -> approved | rejected`, both terminal.

use chrono::{DateTime, Utc};

use crate::error::EngineError;
use crate::model::{FillRequest, FillRequestStatus, ValveStatus};
use crate::storage::Storage;

/// Create a fill request for a tank, targeting `requested_level` percent.
///
/// Idempotent: when a pending request already exists for the tank it is
/// returned as-is instead of creating a duplicate. Fails with
/// [`EngineError::NotFound`] for an unknown tank.
pub async fn request_fill(
    storage: &Storage,
    tank_id: &str,
    requested_level: f64,
    now: DateTime<Utc>,
) -> Result<FillRequest, EngineError> {
    if storage.get_tank(tank_id).await?.is_none() {
        return Err(EngineError::not_found("tank", tank_id));
    }

    if let Some(existing) = storage.pending_fill_request_for_tank(tank_id).await? {
        return Ok(existing);
    }

    let request = FillRequest {
        id: Storage::new_id("fill"),
        tank_id: tank_id.to_string(),
        requested_level,
        status: FillRequestStatus::Pending,
        requested_at: now,
        approved_at: None,
    };
    storage.insert_fill_request(&request).await?;

    Ok(request)
}

/// Approve a pending fill request and open the tank's valve.
///
/// The valve write is fire-and-forget: a tank that has disappeared in
/// the meantime (weak reference) does not fail the approval. Fails with
/// [`EngineError::NotFound`] for an unknown request id and
/// [`EngineError::AlreadyProcessed`] when the request is not pending.
pub async fn approve_fill(
    storage: &Storage,
    request_id: &str,
    now: DateTime<Utc>,
) -> Result<FillRequest, EngineError> {
    let request = storage
        .get_fill_request(request_id)
        .await?
        .ok_or_else(|| EngineError::not_found("fill request", request_id))?;

    if request.status.is_terminal() {
        return Err(EngineError::already_processed("fill request", request_id));
    }

    // The settle is guarded on the pending state, so a concurrent
    // approval or rejection loses here rather than double-applying.
    let applied = storage
        .settle_fill_request(request_id, FillRequestStatus::Approved, Some(now))
        .await?;
    if !applied {
        return Err(EngineError::already_processed("fill request", request_id));
    }

    storage
        .set_valve_status(&request.tank_id, ValveStatus::Open)
        .await?;

    storage
        .get_fill_request(request_id)
        .await?
        .ok_or_else(|| EngineError::not_found("fill request", request_id))
}

/// Reject a pending fill request. Terminal; the valve is left untouched.
pub async fn reject_fill(storage: &Storage, request_id: &str) -> Result<FillRequest, EngineError> {
    let request = storage
        .get_fill_request(request_id)
        .await?
        .ok_or_else(|| EngineError::not_found("fill request", request_id))?;

    if request.status.is_terminal() {
        return Err(EngineError::already_processed("fill request", request_id));
    }

    let applied = storage
        .settle_fill_request(request_id, FillRequestStatus::Rejected, None)
        .await?;
    if !applied {
        return Err(EngineError::already_processed("fill request", request_id));
    }

    storage
        .get_fill_request(request_id)
        .await?
        .ok_or_else(|| EngineError::not_found("fill request", request_id))
}
