// crates/objfun-core/src/core/state.rs
// ============================================================================
// Module: Run State
// Description: Lifecycle states of lookup-table runs.
// Purpose: Provide stable state labels for persistence and worker protocols.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! A run moves `Provisional -> New -> Active -> Completed` in normal
//! operation. Workers that stage model configuration may route runs through
//! `Configuring` and `Configured` using explicit state transitions.
//!
//! Labels are persisted verbatim by the stores and accepted on the command
//! line, so they must never change.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Run State
// ============================================================================

/// Run lifecycle state.
///
/// # Invariants
/// - Variants are stable for serialization and persistence.
/// - `Provisional` runs exist only while the preliminary pass is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Requested during a preliminary pass; promoted or deleted afterwards.
    Provisional,
    /// Awaiting a worker.
    New,
    /// Claimed by a worker that is preparing model configuration.
    Configuring,
    /// Model configuration prepared; awaiting execution.
    Configured,
    /// Claimed by a worker; awaiting a result.
    Active,
    /// Result deposited.
    Completed,
}

impl RunState {
    /// All states in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Provisional,
        Self::New,
        Self::Configuring,
        Self::Configured,
        Self::Active,
        Self::Completed,
    ];

    /// Returns the stable label for the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Provisional => "provisional",
            Self::New => "new",
            Self::Configuring => "configuring",
            Self::Configured => "configured",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown state label.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown run state: {0}")]
pub struct UnknownRunState(pub String);

impl FromStr for RunState {
    type Err = UnknownRunState;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let normalized = label.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| UnknownRunState(label.to_string()))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
