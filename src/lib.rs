//! AquaMon - monitoring and administration for a building's water
//! distribution system.
//!
//! # Overview
//!
//! AquaMon tracks one tank per floor plus the central cistern, raises
//! alerts when levels breach the monitoring thresholds, and manages the
//! approval-gated refill workflow. The heart of the service is the
//! alert lifecycle:
//!
//! - raise: `critical` below 15%, `low` below 25%
//! - resolve: explicit admin action, valve open and level at least 50%
//! - reactivate: level regresses below 50% within 24h of resolution
//! - stable: level holds through 48h, alert exempt from further checks
//!
//! # Modules
//!
//! - [`model`]: Domain types for tanks, alerts, fill requests, trucks
//! - [`policy`]: Pure threshold and lifecycle decision logic
//! - [`engine`]: Applies policy decisions to stored records
//! - [`fill`]: Fill request coordination (request/approve/reject)
//! - [`storage`]: SQLite storage layer
//! - [`forecast`]: Client for the external consumption predictor
//! - [`error`]: Typed failure taxonomy
//! - [`api`]: HTTP API handlers

pub mod api;
pub mod engine;
pub mod error;
pub mod fill;
pub mod forecast;
pub mod model;
pub mod policy;
pub mod storage;
