//! Tank alert and refill policy.
//!
//! Pure decision logic mapping tank snapshots and alert history to the
//! alert-state transitions the service must apply. Nothing in this module
//! touches storage or the clock: every function takes its inputs
//! explicitly (including `now`), which keeps the engine deterministic
//! under test and safe to invoke from concurrent callers as long as
//! writes to the same alert are serialized by the storage layer.
//!
//! # Lifecycle
//!
//! - An alert is raised when a tank's level crosses below 25% and no
//!   open alert exists for that tank (`critical` below 15%, `low`
//!   otherwise).
//! - An open `low` alert escalates in place to `critical` when the
//!   level keeps falling below 15%.
//! - Resolution is an explicit administrator action, permitted only
//!   when the valve is open and the level has recovered to at least 50%.
//! - For 24 hours after resolution the alert is re-raised automatically
//!   if the level is observed below 50% again.
//! - Once the level has held at or above 50% through the 48-hour mark,
//!   the alert is confirmed stable and exempt from further checks.

use chrono::{DateTime, Duration, Utc};

use crate::error::ResolveBlocker;
use crate::model::{Alert, AlertSeverity, Tank, ValveStatus};

/// Level below which a fresh alert is raised as `critical`.
pub const CRITICAL_THRESHOLD: f64 = 15.0;

/// Level below which a fresh alert is raised as `low`.
pub const LOW_THRESHOLD: f64 = 25.0;

/// Minimum level (with the valve open) at which an alert may be resolved.
pub const RESOLVE_THRESHOLD: f64 = 50.0;

/// Observation window after resolution during which a regression below
/// [`RESOLVE_THRESHOLD`] reactivates the alert.
pub const REACTIVATION_WINDOW_HOURS: i64 = 24;

/// Time after resolution at which, absent a reactivation, the alert is
/// confirmed permanently stable.
pub const STABILITY_WINDOW_HOURS: i64 = 48;

/// Outcome of evaluating one tank against its open alert (if any).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    /// No open alert exists and the level warrants one.
    Raise(AlertSeverity),

    /// The open `low` alert must become `critical` (same alert id).
    Escalate,

    /// Nothing to do. Either the level is healthy, or an open alert
    /// already covers the current severity.
    Noop,
}

/// Outcome of a post-resolution reactivation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactivationDecision {
    /// Level regressed below the stability threshold inside the
    /// 24-hour window: clear `is_resolved`, set `reactivated`.
    Reactivate,

    /// No change required at this observation.
    Stable,

    /// The 48-hour mark passed with the level still at or above the
    /// threshold: mark the alert permanently stable.
    ConfirmStable,
}

/// Decide what (if anything) must happen to a tank's alert state.
///
/// `open_alert` is the currently unresolved alert for this tank, if one
/// exists; the caller guarantees at most one. Side-effect-free: the
/// caller persists the decision.
///
/// Decision table:
///
/// | level        | open alert      | decision          |
/// |--------------|-----------------|-------------------|
/// | < 15         | none            | `Raise(Critical)` |
/// | < 15         | `low`           | `Escalate`        |
/// | 15..<25      | none            | `Raise(Low)`      |
/// | >= 25        | none            | `Noop`            |
/// | any          | covers severity | `Noop`            |
pub fn evaluate_tank(tank: &Tank, open_alert: Option<&Alert>) -> AlertDecision {
    let warranted = AlertSeverity::for_level(tank.level);

    match open_alert {
        None => match warranted {
            Some(severity) => AlertDecision::Raise(severity),
            None => AlertDecision::Noop,
        },
        Some(alert) => {
            if alert.severity == AlertSeverity::Low && warranted == Some(AlertSeverity::Critical) {
                AlertDecision::Escalate
            } else {
                // An open alert is never auto-closed here; resolution is
                // an explicit administrator action.
                AlertDecision::Noop
            }
        }
    }
}

/// Return the reason an alert on this tank cannot be resolved right now,
/// or `None` when resolution is permitted.
///
/// The valve is checked before the level: when both preconditions fail,
/// opening the valve is the remediation that eventually clears the
/// level blocker too.
pub fn resolve_blocker(tank: &Tank) -> Option<ResolveBlocker> {
    if tank.valve_status != ValveStatus::Open {
        Some(ResolveBlocker::ValveClosed)
    } else if tank.level < RESOLVE_THRESHOLD {
        Some(ResolveBlocker::LevelLow)
    } else {
        None
    }
}

/// True iff the tank's valve is open and its level is at least 50%.
pub fn can_resolve(tank: &Tank) -> bool {
    resolve_blocker(tank).is_none()
}

/// Check whether a resolved alert must reactivate or can be confirmed
/// stable, given the tank's current level at time `now`.
///
/// Returns `None` when the check does not apply: the alert is still
/// open, already confirmed stable, or carries no resolution timestamp.
/// Otherwise:
///
/// - within 24h of resolution with level < 50 → [`ReactivationDecision::Reactivate`]
/// - at or past 48h with level >= 50 → [`ReactivationDecision::ConfirmStable`]
/// - anything else → [`ReactivationDecision::Stable`]
///
/// Reactivation is only defined inside the 24-hour window; a dip after
/// it closes (even before the 48-hour confirmation) never re-raises the
/// alert. The function is pure, so repeated invocation with the same
/// inputs yields the same decision.
pub fn check_reactivation(
    alert: &Alert,
    tank: &Tank,
    now: DateTime<Utc>,
) -> Option<ReactivationDecision> {
    if !alert.is_resolved || alert.stable {
        return None;
    }
    let resolved_at = alert.resolved_at?;
    let elapsed = now.signed_duration_since(resolved_at);

    if elapsed <= Duration::hours(REACTIVATION_WINDOW_HOURS) {
        if tank.level < RESOLVE_THRESHOLD {
            return Some(ReactivationDecision::Reactivate);
        }
        return Some(ReactivationDecision::Stable);
    }

    if elapsed >= Duration::hours(STABILITY_WINDOW_HOURS) && tank.level >= RESOLVE_THRESHOLD {
        return Some(ReactivationDecision::ConfirmStable);
    }

    Some(ReactivationDecision::Stable)
}

/// Display label for a tank, used in alert messages and logs.
pub fn tank_label(tank: &Tank) -> String {
    if tank.is_cistern() {
        "Main cistern".to_string()
    } else if let Some(room) = &tank.room_number {
        format!("Tank {room} (floor {})", tank.floor)
    } else {
        format!("Floor {} tank", tank.floor)
    }
}

/// Generate the human-readable message stored on an alert at raise time.
pub fn alert_message(tank: &Tank, severity: AlertSeverity) -> String {
    let label = tank_label(tank);
    match severity {
        AlertSeverity::Critical => format!(
            "CRITICAL: {} is at {:.1}%, below the {:.0}% critical threshold. \
             Immediate refill required.",
            label, tank.level, CRITICAL_THRESHOLD
        ),
        AlertSeverity::Low => format!(
            "WARNING: {} is at {:.1}%, below the {:.0}% low-level threshold. \
             Schedule a refill.",
            label, tank.level, LOW_THRESHOLD
        ),
    }
}
