//! SQLite storage layer for AquaMon.
//!
//! Holds the durable records the policy engine operates on: tanks,
//! alerts, fill requests, and truck deliveries. The engine itself is
//! stateless; every lifecycle fact lives in these tables.
//!
//! Timestamps are stored as Unix seconds and are always written by this
//! module, so reads never see an out-of-range value. Enum columns are
//! stored as their lowercase text form (see the `as_str`/`parse` pairs
//! in [`crate::model`]).

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use uuid::Uuid;

use crate::model::{
    Alert, AlertSeverity, FillRequest, FillRequestStatus, Tank, Truck, TruckStatus, ValveStatus,
};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

fn from_ts(ts: i64) -> DateTime<Utc> {
    // Written by this module, always in range.
    DateTime::<Utc>::from_timestamp(ts, 0).unwrap_or_default()
}

fn tank_from_row(row: &SqliteRow) -> Result<Tank> {
    let valve: String = row.get("valve_status");
    Ok(Tank {
        id: row.get("id"),
        floor: row.get("floor"),
        room_number: row.get("room_number"),
        level: row.get("level"),
        capacity_liters: row.get("capacity_liters"),
        valve_status: ValveStatus::parse(&valve)
            .ok_or_else(|| anyhow!("invalid valve status in database: {valve}"))?,
        last_updated: from_ts(row.get("last_updated")),
    })
}

fn alert_from_row(row: &SqliteRow) -> Result<Alert> {
    let severity: String = row.get("severity");
    let resolved_at: Option<i64> = row.get("resolved_at");
    Ok(Alert {
        id: row.get("id"),
        tank_id: row.get("tank_id"),
        severity: AlertSeverity::parse(&severity)
            .ok_or_else(|| anyhow!("invalid alert severity in database: {severity}"))?,
        message: row.get("message"),
        is_resolved: row.get("is_resolved"),
        reactivated: row.get("reactivated"),
        stable: row.get("stable"),
        level_at_resolve: row.get("level_at_resolve"),
        created_at: from_ts(row.get("created_at")),
        resolved_at: resolved_at.map(from_ts),
        resolved_by: row.get("resolved_by"),
    })
}

fn fill_request_from_row(row: &SqliteRow) -> Result<FillRequest> {
    let status: String = row.get("status");
    let approved_at: Option<i64> = row.get("approved_at");
    Ok(FillRequest {
        id: row.get("id"),
        tank_id: row.get("tank_id"),
        requested_level: row.get("requested_level"),
        status: FillRequestStatus::parse(&status)
            .ok_or_else(|| anyhow!("invalid fill request status in database: {status}"))?,
        requested_at: from_ts(row.get("requested_at")),
        approved_at: approved_at.map(from_ts),
    })
}

fn truck_from_row(row: &SqliteRow) -> Result<Truck> {
    let status: String = row.get("status");
    Ok(Truck {
        id: row.get("id"),
        truck_number: row.get("truck_number"),
        arrival_date: from_ts(row.get("arrival_date")),
        water_delivered_liters: row.get("water_delivered_liters"),
        status: TruckStatus::parse(&status)
            .ok_or_else(|| anyhow!("invalid truck status in database: {status}"))?,
        notes: row.get("notes"),
        created_at: from_ts(row.get("created_at")),
    })
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:aquamon.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tanks (
                id TEXT PRIMARY KEY,
                floor INTEGER NOT NULL,
                room_number TEXT,
                level REAL NOT NULL,
                capacity_liters INTEGER NOT NULL,
                valve_status TEXT NOT NULL,
                last_updated INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id TEXT PRIMARY KEY,
                tank_id TEXT NOT NULL,
                severity TEXT NOT NULL,
                message TEXT NOT NULL,
                is_resolved INTEGER NOT NULL DEFAULT 0,
                reactivated INTEGER NOT NULL DEFAULT 0,
                stable INTEGER NOT NULL DEFAULT 0,
                level_at_resolve REAL,
                created_at INTEGER NOT NULL,
                resolved_at INTEGER,
                resolved_by TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // One open alert per tank is an engine invariant; the partial
        // index makes it a storage invariant too.
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_alerts_open_tank
            ON alerts(tank_id) WHERE is_resolved = 0
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fill_requests (
                id TEXT PRIMARY KEY,
                tank_id TEXT NOT NULL,
                requested_level REAL NOT NULL,
                status TEXT NOT NULL,
                requested_at INTEGER NOT NULL,
                approved_at INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_fill_requests_pending_tank
            ON fill_requests(tank_id) WHERE status = 'pending'
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trucks (
                id TEXT PRIMARY KEY,
                truck_number TEXT NOT NULL,
                arrival_date INTEGER NOT NULL,
                water_delivered_liters REAL NOT NULL,
                status TEXT NOT NULL,
                notes TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Generate a fresh row identifier with a type prefix.
    pub fn new_id(prefix: &str) -> String {
        format!("{prefix}-{}", Uuid::new_v4())
    }

    // ------------------------------------------------------------------
    // Tanks
    // ------------------------------------------------------------------

    pub async fn insert_tank(&self, tank: &Tank) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tanks (id, floor, room_number, level, capacity_liters, valve_status, last_updated)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&tank.id)
        .bind(tank.floor)
        .bind(&tank.room_number)
        .bind(tank.level)
        .bind(tank.capacity_liters)
        .bind(tank.valve_status.as_str())
        .bind(tank.last_updated.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_tank(&self, id: &str) -> Result<Option<Tank>> {
        let row = sqlx::query("SELECT * FROM tanks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(tank_from_row).transpose()
    }

    /// All tanks, cistern first, then by floor.
    pub async fn list_tanks(&self) -> Result<Vec<Tank>> {
        let rows = sqlx::query("SELECT * FROM tanks ORDER BY floor, id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(tank_from_row).collect()
    }

    pub async fn count_tanks(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM tanks")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    /// Admin write path: record a new level reading. The caller is
    /// responsible for validating the `0..=100` range.
    ///
    /// Returns false when the tank does not exist.
    pub async fn set_level(&self, id: &str, level: f64, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query("UPDATE tanks SET level = ?, last_updated = ? WHERE id = ?")
            .bind(level)
            .bind(now.timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Returns false when the tank does not exist.
    pub async fn set_valve_status(&self, id: &str, status: ValveStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE tanks SET valve_status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------------
    // Alerts
    // ------------------------------------------------------------------

    pub async fn insert_alert(&self, alert: &Alert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alerts
                (id, tank_id, severity, message, is_resolved, reactivated, stable,
                 level_at_resolve, created_at, resolved_at, resolved_by)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&alert.id)
        .bind(&alert.tank_id)
        .bind(alert.severity.as_str())
        .bind(&alert.message)
        .bind(alert.is_resolved)
        .bind(alert.reactivated)
        .bind(alert.stable)
        .bind(alert.level_at_resolve)
        .bind(alert.created_at.timestamp())
        .bind(alert.resolved_at.map(|t| t.timestamp()))
        .bind(&alert.resolved_by)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_alert(&self, id: &str) -> Result<Option<Alert>> {
        let row = sqlx::query("SELECT * FROM alerts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(alert_from_row).transpose()
    }

    /// The single open (unresolved) alert for a tank, if any.
    pub async fn open_alert_for_tank(&self, tank_id: &str) -> Result<Option<Alert>> {
        let row = sqlx::query("SELECT * FROM alerts WHERE tank_id = ? AND is_resolved = 0")
            .bind(tank_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(alert_from_row).transpose()
    }

    /// Alerts, newest first. With `active_only` set, only open ones.
    pub async fn list_alerts(&self, active_only: bool) -> Result<Vec<Alert>> {
        let query = if active_only {
            "SELECT * FROM alerts WHERE is_resolved = 0 ORDER BY created_at DESC, id"
        } else {
            "SELECT * FROM alerts ORDER BY created_at DESC, id"
        };

        let rows = sqlx::query(query).fetch_all(&self.pool).await?;
        rows.iter().map(alert_from_row).collect()
    }

    /// Resolved alerts still subject to reactivation/stability checks.
    pub async fn list_resolved_unstable_alerts(&self) -> Result<Vec<Alert>> {
        let rows = sqlx::query(
            "SELECT * FROM alerts WHERE is_resolved = 1 AND stable = 0 ORDER BY resolved_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(alert_from_row).collect()
    }

    /// Escalate an open alert in place (same id), updating its severity
    /// and message.
    ///
    /// Guarded on `is_resolved = 0` so an escalation racing a resolution
    /// cannot mutate an alert that was resolved in between.
    pub async fn escalate_alert(
        &self,
        id: &str,
        severity: AlertSeverity,
        message: &str,
    ) -> Result<bool> {
        let result =
            sqlx::query("UPDATE alerts SET severity = ?, message = ? WHERE id = ? AND is_resolved = 0")
                .bind(severity.as_str())
                .bind(message)
                .bind(id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Close an open alert, recording who resolved it and the level
    /// observed at the time.
    ///
    /// Guarded on `is_resolved = 0` so that of two concurrent
    /// resolutions exactly one applies; returns false when the alert was
    /// already resolved, leaving the first resolver's record intact.
    pub async fn mark_alert_resolved(
        &self,
        id: &str,
        resolved_at: DateTime<Utc>,
        resolved_by: &str,
        level_at_resolve: f64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE alerts
            SET is_resolved = 1, resolved_at = ?, resolved_by = ?, level_at_resolve = ?
            WHERE id = ? AND is_resolved = 0
            "#,
        )
        .bind(resolved_at.timestamp())
        .bind(resolved_by)
        .bind(level_at_resolve)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Re-open a resolved alert with a recomputed severity.
    ///
    /// Guarded on `is_resolved = 1` so that a concurrent sweep applying
    /// the same decision cannot reactivate twice; returns false when the
    /// alert was already open.
    pub async fn mark_alert_reactivated(&self, id: &str, severity: AlertSeverity) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE alerts
            SET is_resolved = 0, reactivated = 1, severity = ?
            WHERE id = ? AND is_resolved = 1
            "#,
        )
        .bind(severity.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_alert_stable(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE alerts SET stable = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Fill requests
    // ------------------------------------------------------------------

    pub async fn insert_fill_request(&self, request: &FillRequest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fill_requests
                (id, tank_id, requested_level, status, requested_at, approved_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&request.id)
        .bind(&request.tank_id)
        .bind(request.requested_level)
        .bind(request.status.as_str())
        .bind(request.requested_at.timestamp())
        .bind(request.approved_at.map(|t| t.timestamp()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_fill_request(&self, id: &str) -> Result<Option<FillRequest>> {
        let row = sqlx::query("SELECT * FROM fill_requests WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(fill_request_from_row).transpose()
    }

    /// The pending request for a tank, if one exists. At most one by
    /// the partial unique index.
    pub async fn pending_fill_request_for_tank(&self, tank_id: &str) -> Result<Option<FillRequest>> {
        let row = sqlx::query("SELECT * FROM fill_requests WHERE tank_id = ? AND status = 'pending'")
            .bind(tank_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(fill_request_from_row).transpose()
    }

    pub async fn list_fill_requests(
        &self,
        status: Option<FillRequestStatus>,
    ) -> Result<Vec<FillRequest>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT * FROM fill_requests WHERE status = ? ORDER BY requested_at DESC, id",
                )
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM fill_requests ORDER BY requested_at DESC, id")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(fill_request_from_row).collect()
    }

    /// Move a pending request into a terminal state.
    ///
    /// Guarded on `status = 'pending'` so two concurrent approvals
    /// cannot both succeed; returns false when the request was no
    /// longer pending.
    pub async fn settle_fill_request(
        &self,
        id: &str,
        status: FillRequestStatus,
        approved_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE fill_requests
            SET status = ?, approved_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(status.as_str())
        .bind(approved_at.map(|t| t.timestamp()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------------
    // Trucks
    // ------------------------------------------------------------------

    pub async fn insert_truck(&self, truck: &Truck) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trucks
                (id, truck_number, arrival_date, water_delivered_liters, status, notes, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&truck.id)
        .bind(&truck.truck_number)
        .bind(truck.arrival_date.timestamp())
        .bind(truck.water_delivered_liters)
        .bind(truck.status.as_str())
        .bind(&truck.notes)
        .bind(truck.created_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_truck(&self, id: &str) -> Result<Option<Truck>> {
        let row = sqlx::query("SELECT * FROM trucks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(truck_from_row).transpose()
    }

    pub async fn list_trucks(&self) -> Result<Vec<Truck>> {
        let rows = sqlx::query("SELECT * FROM trucks ORDER BY arrival_date, id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(truck_from_row).collect()
    }

    pub async fn set_truck_status(&self, id: &str, status: TruckStatus) -> Result<()> {
        sqlx::query("UPDATE trucks SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Arrival time of the earliest still-scheduled truck at or after `now`.
    pub async fn next_scheduled_truck(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            r#"
            SELECT MIN(arrival_date) AS next_arrival
            FROM trucks
            WHERE status = 'scheduled' AND arrival_date >= ?
            "#,
        )
        .bind(now.timestamp())
        .fetch_one(&self.pool)
        .await?;

        let next: Option<i64> = row.get("next_arrival");
        Ok(next.map(from_ts))
    }
}
