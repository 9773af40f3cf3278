//! Data models for AquaMon.
//!
//! The domain is a building water distribution system: one tank per floor
//! plus a central cistern, delivery trucks that top the cistern up, and an
//! alert lifecycle that tracks tanks whose level has fallen below the
//! monitoring thresholds.
//!
//! All timestamps are UTC and server-assigned. Levels are percentages in
//! `0..=100` of the tank's `capacity_liters`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Binary gate controlling inflow to a tank. `Open` enables filling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValveStatus {
    Open,
    Closed,
}

impl ValveStatus {
    /// Database/text representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValveStatus::Open => "open",
            ValveStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(ValveStatus::Open),
            "closed" => Some(ValveStatus::Closed),
            _ => None,
        }
    }
}

/// A monitored water container: a per-floor tank or the building cistern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tank {
    /// Stable identifier.
    pub id: String,

    /// Floor number. Floor 0 is the central cistern.
    pub floor: i64,

    /// Optional display label, e.g. "A-301".
    pub room_number: Option<String>,

    /// Current fill ratio as a percentage, `0..=100`.
    pub level: f64,

    /// Total volume in liters. Always positive.
    pub capacity_liters: i64,

    /// Whether the inflow valve is currently open.
    pub valve_status: ValveStatus,

    /// Timestamp of the last level reading (UTC).
    pub last_updated: DateTime<Utc>,
}

impl Tank {
    pub fn is_cistern(&self) -> bool {
        self.floor == 0
    }
}

/// Severity of a raised alert, fixed at raise time and only ever escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Level below 15% at raise time. Immediate action required.
    Critical,

    /// Level below 25% (but at least 15%) at raise time.
    Low,
}

impl AlertSeverity {
    /// Derive the severity a fresh alert would carry for a given level.
    ///
    /// Returns `None` when the level is at or above the low-alert
    /// threshold, meaning no alert is warranted.
    ///
    /// # Thresholds
    ///
    /// - `critical`: level < 15
    /// - `low`: 15 <= level < 25
    /// - no alert: level >= 25
    pub fn for_level(level: f64) -> Option<Self> {
        if level < crate::policy::CRITICAL_THRESHOLD {
            Some(AlertSeverity::Critical)
        } else if level < crate::policy::LOW_THRESHOLD {
            Some(AlertSeverity::Low)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Critical => "critical",
            AlertSeverity::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "critical" => Some(AlertSeverity::Critical),
            "low" => Some(AlertSeverity::Low),
            _ => None,
        }
    }
}

/// A raised condition on a tank, with a resolution lifecycle.
///
/// At most one open (unresolved) alert exists per tank. A resolved alert
/// can come back (`reactivated = true`) if the tank's level regresses
/// below the stability threshold within the 24-hour observation window;
/// once the level has held for 48 hours the alert is marked `stable` and
/// is exempt from further automatic checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,

    /// The tank that triggered this alert. Weak reference: the tank row
    /// may be deleted independently.
    pub tank_id: String,

    pub severity: AlertSeverity,

    /// Human-readable description, generated at raise time.
    pub message: String,

    pub is_resolved: bool,

    /// True if a previously resolved alert was re-raised because the
    /// level fell back below the stability threshold.
    pub reactivated: bool,

    /// True once the level has held at or above the stability threshold
    /// for the full 48-hour confirmation window. Permanent.
    pub stable: bool,

    /// Level recorded at the moment of resolution.
    pub level_at_resolve: Option<f64>,

    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,

    /// Identifier of the acting administrator, if resolved.
    pub resolved_by: Option<String>,
}

/// Lifecycle state of a fill request: `pending` until an administrator
/// approves or rejects it, both of which are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl FillRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FillRequestStatus::Pending => "pending",
            FillRequestStatus::Approved => "approved",
            FillRequestStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FillRequestStatus::Pending),
            "approved" => Some(FillRequestStatus::Approved),
            "rejected" => Some(FillRequestStatus::Rejected),
            _ => None,
        }
    }

    /// Whether this request can still be acted on.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FillRequestStatus::Pending)
    }
}

/// An administrator-initiated, approval-gated action to open a tank's
/// valve. At most one pending request exists per tank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillRequest {
    pub id: String,
    pub tank_id: String,

    /// Target fill percentage. Defaults to 100.
    pub requested_level: f64,

    pub status: FillRequestStatus,
    pub requested_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
}

/// Delivery lifecycle of a water truck: `scheduled`, then `arrived`,
/// then `delivered`. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruckStatus {
    Scheduled,
    Arrived,
    Delivered,
}

impl TruckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TruckStatus::Scheduled => "scheduled",
            TruckStatus::Arrived => "arrived",
            TruckStatus::Delivered => "delivered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(TruckStatus::Scheduled),
            "arrived" => Some(TruckStatus::Arrived),
            "delivered" => Some(TruckStatus::Delivered),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            TruckStatus::Scheduled => 0,
            TruckStatus::Arrived => 1,
            TruckStatus::Delivered => 2,
        }
    }

    /// Whether a status update from `self` to `next` is a legal forward
    /// transition.
    pub fn can_advance_to(&self, next: TruckStatus) -> bool {
        next.rank() > self.rank()
    }
}

/// A scheduled or completed water delivery to the building cistern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Truck {
    pub id: String,
    pub truck_number: String,
    pub arrival_date: DateTime<Utc>,
    pub water_delivered_liters: f64,
    pub status: TruckStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Request/response types for the HTTP surface
// ============================================================================

/// Body for PUT /tanks/{id}/level. Validated to `0..=100` by the handler.
#[derive(Debug, Clone, Deserialize)]
pub struct SetLevelRequest {
    pub level: f64,
}

/// Body for PUT /tanks/{id}/valve.
#[derive(Debug, Clone, Deserialize)]
pub struct SetValveRequest {
    pub status: ValveStatus,
}

/// Body for actions attributed to an administrator (resolve, approve,
/// reject). The actor is a caller-supplied identifier; authentication is
/// out of scope for this service.
#[derive(Debug, Clone, Deserialize)]
pub struct ActorRequest {
    pub actor: String,
}

/// Body for POST /fill-requests.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateFillRequest {
    pub tank_id: String,

    /// Target fill percentage (default 100).
    #[serde(default = "default_requested_level")]
    pub requested_level: f64,
}

fn default_requested_level() -> f64 {
    100.0
}

/// Query parameters for GET /alerts.
#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    /// When true, return only open (unresolved) alerts.
    pub active: Option<bool>,
}

/// Query parameters for GET /fill-requests.
#[derive(Debug, Deserialize)]
pub struct FillRequestsQuery {
    pub status: Option<FillRequestStatus>,
}

/// Body for PUT /trucks/{id}/status.
#[derive(Debug, Clone, Deserialize)]
pub struct TruckStatusRequest {
    pub status: TruckStatus,
}

/// Response for GET /dashboard/stats.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total_tanks: i64,

    /// Mean level across all tanks (cistern included), percentage.
    pub average_level: f64,

    /// Tanks below the low-alert threshold (25%).
    pub critical_tanks: i64,

    /// Tanks with the inflow valve currently open.
    pub open_valves: i64,

    pub total_capacity_liters: i64,

    /// Arrival time of the next scheduled truck, if any.
    pub next_truck: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_for_level_critical() {
        assert_eq!(AlertSeverity::for_level(0.0), Some(AlertSeverity::Critical));
        assert_eq!(
            AlertSeverity::for_level(14.9),
            Some(AlertSeverity::Critical)
        );
    }

    #[test]
    fn test_severity_for_level_low() {
        assert_eq!(AlertSeverity::for_level(15.0), Some(AlertSeverity::Low));
        assert_eq!(AlertSeverity::for_level(24.9), Some(AlertSeverity::Low));
    }

    #[test]
    fn test_severity_for_level_none() {
        assert_eq!(AlertSeverity::for_level(25.0), None);
        assert_eq!(AlertSeverity::for_level(100.0), None);
    }

    #[test]
    fn test_valve_status_round_trip() {
        assert_eq!(ValveStatus::parse("open"), Some(ValveStatus::Open));
        assert_eq!(ValveStatus::parse("closed"), Some(ValveStatus::Closed));
        assert_eq!(ValveStatus::parse("ajar"), None);
        assert_eq!(ValveStatus::Open.as_str(), "open");
    }

    #[test]
    fn test_truck_status_forward_only() {
        assert!(TruckStatus::Scheduled.can_advance_to(TruckStatus::Arrived));
        assert!(TruckStatus::Scheduled.can_advance_to(TruckStatus::Delivered));
        assert!(TruckStatus::Arrived.can_advance_to(TruckStatus::Delivered));
        assert!(!TruckStatus::Delivered.can_advance_to(TruckStatus::Arrived));
        assert!(!TruckStatus::Arrived.can_advance_to(TruckStatus::Arrived));
    }

    #[test]
    fn test_fill_request_status_terminal() {
        assert!(!FillRequestStatus::Pending.is_terminal());
        assert!(FillRequestStatus::Approved.is_terminal());
        assert!(FillRequestStatus::Rejected.is_terminal());
    }
}
