// crates/objfun-core/src/core/payload.rs
// ============================================================================
// Module: Result Payloads
// Description: Result payload kinds deposited by workers and stored on runs.
// Purpose: Represent scalar, vector and named-series results as tagged variants.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Workers deposit a [`ResultPayload`]. Scalars are stored inline on the run;
//! vector payloads are written to a JSON file named from the run id and the
//! run stores only the [`StoredResult::FileRef`]. The optimizer receives an
//! [`ObjectiveValue`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::RunId;

// ============================================================================
// SECTION: Payload Kind
// ============================================================================

/// Result payload shape bound to an objective function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    /// Single scalar misfit stored inline.
    Misfit,
    /// Residual vector stored in a file.
    Residual,
    /// Observation-name keyed vector stored in a file.
    #[serde(rename = "simobs")]
    SimObs,
}

impl PayloadKind {
    /// Returns the stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Misfit => "misfit",
            Self::Residual => "residual",
            Self::SimObs => "simobs",
        }
    }

    /// Returns the payload file name for a run, if the kind uses files.
    #[must_use]
    pub fn file_name(self, run_id: RunId) -> Option<String> {
        match self {
            Self::Misfit => None,
            Self::Residual => Some(format!("residuals_{run_id}.json")),
            Self::SimObs => Some(format!("simobs_{run_id}.json")),
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Payloads
// ============================================================================

/// Result deposited by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResultPayload {
    /// Scalar misfit.
    Scalar(f64),
    /// Residual vector.
    Residuals(Vec<f64>),
    /// Simulated observations keyed by observation name.
    NamedSeries(BTreeMap<String, f64>),
}

impl ResultPayload {
    /// Returns the payload kind this value belongs to.
    #[must_use]
    pub const fn kind(&self) -> PayloadKind {
        match self {
            Self::Scalar(_) => PayloadKind::Misfit,
            Self::Residuals(_) => PayloadKind::Residual,
            Self::NamedSeries(_) => PayloadKind::SimObs,
        }
    }
}

/// Result as recorded on a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StoredResult {
    /// Inline scalar value.
    Scalar(f64),
    /// Path of the file holding a vector payload.
    FileRef(PathBuf),
}

/// Value returned to the optimizer.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectiveValue {
    /// Scalar objective.
    Scalar(f64),
    /// Vector objective (residuals or simulated observations).
    Vector(Vec<f64>),
}

impl ObjectiveValue {
    /// Returns the scalar value, if any.
    #[must_use]
    pub const fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(value) => Some(*value),
            Self::Vector(_) => None,
        }
    }

    /// Returns the vector value, if any.
    #[must_use]
    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Self::Scalar(_) => None,
            Self::Vector(values) => Some(values),
        }
    }
}
