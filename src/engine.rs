//! Alert engine: applies the pure policy decisions to stored records.
//!
//! This is the seam between [`crate::policy`] (side-effect-free
//! decisions) and [`crate::storage`] (durable state). Each function
//! takes the reference time `now` from the caller so behavior is
//! deterministic under test; nothing here reads the wall clock.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::EngineError;
use crate::model::{Alert, AlertSeverity, DashboardStats};
use crate::policy::{
    self, AlertDecision, LOW_THRESHOLD, ReactivationDecision, alert_message, evaluate_tank,
};
use crate::storage::Storage;

/// What the evaluation sweep did for one tank.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum EvaluationOutcome {
    /// A new alert was raised for this tank.
    Raised {
        alert_id: String,
        severity: AlertSeverity,
    },

    /// The tank's open `low` alert was escalated to `critical`.
    Escalated { alert_id: String },

    /// No change was required.
    Noop,
}

/// Per-tank result of [`evaluate_all_tanks`].
#[derive(Debug, Clone, Serialize)]
pub struct TankEvaluation {
    pub tank_id: String,
    pub level: f64,
    #[serde(flatten)]
    pub outcome: EvaluationOutcome,
}

/// What the reactivation sweep did for one resolved alert.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum ReactivationOutcome {
    /// The alert was re-opened with a recomputed severity.
    Reactivated { severity: AlertSeverity },

    /// No change at this observation.
    Stable,

    /// The 48-hour confirmation window passed; the alert is now
    /// permanently stable.
    ConfirmedStable,
}

/// Per-alert result of [`check_all_reactivations`].
#[derive(Debug, Clone, Serialize)]
pub struct AlertReactivation {
    pub alert_id: String,
    pub tank_id: String,
    #[serde(flatten)]
    pub outcome: ReactivationOutcome,
}

/// Evaluate every tank against its open alert and persist the decisions:
/// new rows for raises, in-place severity updates for escalations.
///
/// Run after each data refresh. Safe to call at any frequency: a tank
/// whose open alert already covers its current severity produces `Noop`.
pub async fn evaluate_all_tanks(
    storage: &Storage,
    now: DateTime<Utc>,
) -> Result<Vec<TankEvaluation>, EngineError> {
    let tanks = storage.list_tanks().await?;
    let mut results = Vec::with_capacity(tanks.len());

    for tank in tanks {
        let open_alert = storage.open_alert_for_tank(&tank.id).await?;

        let outcome = match evaluate_tank(&tank, open_alert.as_ref()) {
            AlertDecision::Raise(severity) => {
                let alert = Alert {
                    id: Storage::new_id("alert"),
                    tank_id: tank.id.clone(),
                    severity,
                    message: alert_message(&tank, severity),
                    is_resolved: false,
                    reactivated: false,
                    stable: false,
                    level_at_resolve: None,
                    created_at: now,
                    resolved_at: None,
                    resolved_by: None,
                };
                storage.insert_alert(&alert).await?;
                EvaluationOutcome::Raised {
                    alert_id: alert.id,
                    severity,
                }
            }
            AlertDecision::Escalate => {
                // evaluate_tank only emits Escalate when an open alert exists.
                let alert = open_alert.ok_or_else(|| {
                    EngineError::Dependency(anyhow::anyhow!(
                        "escalation decided without an open alert for tank {}",
                        tank.id
                    ))
                })?;
                let message = alert_message(&tank, AlertSeverity::Critical);
                let applied = storage
                    .escalate_alert(&alert.id, AlertSeverity::Critical, &message)
                    .await?;
                if applied {
                    EvaluationOutcome::Escalated { alert_id: alert.id }
                } else {
                    // The alert was resolved between the read and the
                    // write; nothing left to escalate.
                    EvaluationOutcome::Noop
                }
            }
            AlertDecision::Noop => EvaluationOutcome::Noop,
        };

        results.push(TankEvaluation {
            tank_id: tank.id,
            level: tank.level,
            outcome,
        });
    }

    Ok(results)
}

/// Resolve an open alert on behalf of an administrator.
///
/// Fails with [`EngineError::NotFound`] for unknown alert or tank ids,
/// [`EngineError::AlreadyProcessed`] when the alert is already resolved,
/// and [`EngineError::Precondition`] (with the discriminated reason)
/// when the valve is closed or the level is below 50%.
pub async fn resolve_alert(
    storage: &Storage,
    alert_id: &str,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<Alert, EngineError> {
    let alert = storage
        .get_alert(alert_id)
        .await?
        .ok_or_else(|| EngineError::not_found("alert", alert_id))?;

    if alert.is_resolved {
        return Err(EngineError::already_processed("alert", alert_id));
    }

    let tank = storage
        .get_tank(&alert.tank_id)
        .await?
        .ok_or_else(|| EngineError::not_found("tank", alert.tank_id.clone()))?;

    if let Some(reason) = policy::resolve_blocker(&tank) {
        return Err(EngineError::Precondition { reason });
    }

    let applied = storage
        .mark_alert_resolved(alert_id, now, actor, tank.level)
        .await?;
    if !applied {
        // Lost a race with another resolution of the same alert.
        return Err(EngineError::already_processed("alert", alert_id));
    }

    storage
        .get_alert(alert_id)
        .await?
        .ok_or_else(|| EngineError::not_found("alert", alert_id))
}

/// Run the post-resolution check over every resolved, not-yet-stable
/// alert: reactivate those whose tank regressed below 50% inside the
/// 24-hour window, confirm stability for those past the 48-hour mark.
///
/// Idempotent with respect to repeated invocation: a reactivated alert
/// is open again and drops out of the sweep, and the storage update is
/// guarded so a concurrent sweep cannot apply the same reactivation
/// twice. Alerts whose tank no longer exists are skipped (the tank
/// reference is weak).
pub async fn check_all_reactivations(
    storage: &Storage,
    now: DateTime<Utc>,
) -> Result<Vec<AlertReactivation>, EngineError> {
    let alerts = storage.list_resolved_unstable_alerts().await?;
    let mut results = Vec::with_capacity(alerts.len());

    for alert in alerts {
        let Some(tank) = storage.get_tank(&alert.tank_id).await? else {
            continue;
        };

        let Some(decision) = policy::check_reactivation(&alert, &tank, now) else {
            continue;
        };

        let outcome = match decision {
            ReactivationDecision::Reactivate => {
                // Re-raised with the severity the current level warrants;
                // a level in 25..50 keeps the original severity.
                let severity = AlertSeverity::for_level(tank.level).unwrap_or(alert.severity);
                if storage.mark_alert_reactivated(&alert.id, severity).await? {
                    ReactivationOutcome::Reactivated { severity }
                } else {
                    ReactivationOutcome::Stable
                }
            }
            ReactivationDecision::ConfirmStable => {
                storage.mark_alert_stable(&alert.id).await?;
                ReactivationOutcome::ConfirmedStable
            }
            ReactivationDecision::Stable => ReactivationOutcome::Stable,
        };

        results.push(AlertReactivation {
            alert_id: alert.id,
            tank_id: alert.tank_id,
            outcome,
        });
    }

    Ok(results)
}

/// Building-wide statistics for the dashboard header.
pub async fn dashboard_stats(
    storage: &Storage,
    now: DateTime<Utc>,
) -> Result<DashboardStats, EngineError> {
    let tanks = storage.list_tanks().await?;

    let total_tanks = tanks.len() as i64;
    let average_level = if tanks.is_empty() {
        0.0
    } else {
        tanks.iter().map(|t| t.level).sum::<f64>() / tanks.len() as f64
    };
    let critical_tanks = tanks.iter().filter(|t| t.level < LOW_THRESHOLD).count() as i64;
    let open_valves = tanks
        .iter()
        .filter(|t| t.valve_status == crate::model::ValveStatus::Open)
        .count() as i64;
    let total_capacity_liters = tanks.iter().map(|t| t.capacity_liters).sum();

    let next_truck = storage.next_scheduled_truck(now).await?;

    Ok(DashboardStats {
        total_tanks,
        average_level,
        critical_tanks,
        open_valves,
        total_capacity_liters,
        next_truck,
    })
}
