//! Typed failure taxonomy for the alert engine and fill coordinator.
//!
//! Every engine operation returns one of these variants to its immediate
//! caller; nothing is swallowed and the engine itself never logs or
//! notifies. The API layer translates variants to HTTP statuses and the
//! discriminated `ResolveBlocker` reason lets the caller surface the
//! correct remediation prompt (open the valve vs. wait for the fill).

use serde::Serialize;

/// Why an alert cannot currently be resolved.
///
/// Both preconditions (valve open, level at or above 50%) must hold.
/// When both fail, `ValveClosed` wins: opening the valve is the action
/// that eventually clears the other blocker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveBlocker {
    /// The tank's inflow valve is closed; filling has not started.
    ValveClosed,

    /// The valve is open but the level is still below 50%.
    LevelLow,
}

impl ResolveBlocker {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolveBlocker::ValveClosed => "valve_closed",
            ResolveBlocker::LevelLow => "level_low",
        }
    }
}

/// Errors surfaced by engine and coordinator operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A resolve was attempted without its preconditions met.
    #[error("precondition failed: {reason:?}")]
    Precondition { reason: ResolveBlocker },

    /// Unknown tank, alert, fill request, or truck id.
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    /// State-machine violation: the record is already in a terminal
    /// state (e.g. approving a non-pending fill request, resolving an
    /// already-resolved alert).
    #[error("{what} already processed: {id}")]
    AlreadyProcessed { what: &'static str, id: String },

    /// An invalid state transition was requested (e.g. moving a truck
    /// delivery backwards).
    #[error("invalid transition for {what} {id}")]
    InvalidTransition { what: &'static str, id: String },

    /// An external dependency did not answer within the caller's
    /// timeout. Retryable: the engine holds no mutable state of its own.
    #[error("dependency timed out: {0}")]
    DependencyTimeout(String),

    /// An external collaborator (tank store, alert store, predictor)
    /// failed outright.
    #[error(transparent)]
    Dependency(#[from] anyhow::Error),
}

impl EngineError {
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            what,
            id: id.into(),
        }
    }

    pub fn already_processed(what: &'static str, id: impl Into<String>) -> Self {
        EngineError::AlreadyProcessed {
            what,
            id: id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocker_wire_names() {
        assert_eq!(ResolveBlocker::ValveClosed.as_str(), "valve_closed");
        assert_eq!(ResolveBlocker::LevelLow.as_str(), "level_low");
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::not_found("alert", "a-1");
        assert_eq!(err.to_string(), "alert not found: a-1");

        let err = EngineError::already_processed("fill request", "fr-1");
        assert_eq!(err.to_string(), "fill request already processed: fr-1");
    }
}
