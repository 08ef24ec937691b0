// crates/objfun-core/src/runtime/objective.rs
// ============================================================================
// Module: Objective Function Adapter
// Description: Optimizer-facing objective bound to one result payload kind.
// Purpose: Turn coordinator lookups into values, placeholders or signals.
// Dependencies: crate::runtime::coordinator, rand, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! An [`ObjectiveFunction`] binds a [`LookupCoordinator`] to a single
//! [`PayloadKind`] chosen at construction:
//! - `misfit`: a scalar stored inline on the run;
//! - `residual`: a vector written to `residuals_<run id>.json`;
//! - `simobs`: an observation-name keyed vector written to
//!   `simobs_<run id>.json`, checked against the study's observation names on
//!   every read and write.
//!
//! While a run is pending the optimizer receives a random placeholder of the
//! right shape. Residual placeholders use the length of the first completed
//! residual vector read, or [`DEFAULT_RESIDUAL_LEN`] before that.
//!
//! Payload files are untrusted on load and read with a size limit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;
use tracing::error;

use crate::core::identifiers::RunId;
use crate::core::payload::ObjectiveValue;
use crate::core::payload::PayloadKind;
use crate::core::payload::ResultPayload;
use crate::core::payload::StoredResult;
use crate::core::study::ParameterValues;
use crate::core::study::StudyError;
use crate::interfaces::LookupStore;
use crate::runtime::coordinator::CoordinatorError;
use crate::runtime::coordinator::LookupCoordinator;
use crate::runtime::coordinator::LookupOutcome;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Residual placeholder length before any residual vector was read.
pub const DEFAULT_RESIDUAL_LEN: usize = 50;
/// Maximum payload file size accepted on read (bytes).
const MAX_PAYLOAD_BYTES: u64 = 64 * 1024 * 1024;

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Outcome of an objective evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation<T> {
    /// Completed result.
    Value(T),
    /// Random stand-in for a run that is scheduled but not complete.
    Placeholder(T),
    /// First sighting of the vector; repeat it to schedule a run.
    PreliminaryRun,
    /// A run was scheduled for the vector.
    NewRun,
    /// A different vector was pending confirmation and has been discarded.
    Waiting,
}

impl<T> Evaluation<T> {
    /// Returns the value or placeholder, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Value(value) | Self::Placeholder(value) => Some(value),
            Self::PreliminaryRun | Self::NewRun | Self::Waiting => None,
        }
    }

    /// Returns true for control-flow signals.
    #[must_use]
    pub const fn is_signal(&self) -> bool {
        matches!(self, Self::PreliminaryRun | Self::NewRun | Self::Waiting)
    }

    /// Returns the stable label of the outcome.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Placeholder(_) => "placeholder",
            Self::PreliminaryRun => "preliminary_run",
            Self::NewRun => "new_run",
            Self::Waiting => "waiting",
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Objective function errors.
#[derive(Debug, Error)]
pub enum ObjectiveError {
    /// Coordinator operation failed.
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
    /// Parameter vector could not be converted.
    #[error(transparent)]
    Study(#[from] StudyError),
    /// A non-empty gradient buffer was supplied.
    #[error("only derivative-free optimisation is supported (gradient buffer has {0} entries)")]
    GradientNotSupported(usize),
    /// Payload kind differs from the objective kind.
    #[error("payload kind {actual} does not match objective kind {expected}")]
    KindMismatch {
        /// Objective kind.
        expected: PayloadKind,
        /// Supplied or stored kind.
        actual: PayloadKind,
    },
    /// Named series does not match the study's observation names.
    #[error("observation names do not match: {0}")]
    ObservationMismatch(String),
    /// A stored result has the wrong shape for the objective kind.
    #[error("run {run_id} holds a result unsuitable for {kind} objectives")]
    StoredResultMismatch {
        /// Affected run.
        run_id: RunId,
        /// Objective kind.
        kind: PayloadKind,
    },
    /// A payload file could not be read.
    #[error("payload file {path}: {message}")]
    PayloadFile {
        /// File path.
        path: String,
        /// Failure description.
        message: String,
    },
}

// ============================================================================
// SECTION: Objective Function
// ============================================================================

/// Optimizer-facing objective bound to a lookup coordinator.
#[derive(Debug)]
pub struct ObjectiveFunction<S> {
    /// Lookup coordinator.
    coordinator: LookupCoordinator<S>,
    /// Payload kind of every result.
    kind: PayloadKind,
    /// Directory receiving payload files.
    basedir: PathBuf,
    /// Learned residual vector length (0 until known).
    residual_len: AtomicUsize,
}

impl<S: LookupStore> ObjectiveFunction<S> {
    /// Binds `coordinator` to a payload kind and payload directory.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectiveError::ObservationMismatch`] for a `simobs`
    /// objective on a study without observation names.
    pub fn new(
        coordinator: LookupCoordinator<S>,
        kind: PayloadKind,
        basedir: impl Into<PathBuf>,
    ) -> Result<Self, ObjectiveError> {
        if kind == PayloadKind::SimObs && coordinator.spec().observation_names().is_empty() {
            return Err(ObjectiveError::ObservationMismatch(
                "simobs objectives need observation names".to_string(),
            ));
        }
        Ok(Self {
            coordinator,
            kind,
            basedir: basedir.into(),
            residual_len: AtomicUsize::new(0),
        })
    }

    /// Returns the coordinator.
    #[must_use]
    pub const fn coordinator(&self) -> &LookupCoordinator<S> {
        &self.coordinator
    }

    /// Returns the payload kind.
    #[must_use]
    pub const fn kind(&self) -> PayloadKind {
        self.kind
    }

    /// Returns the payload directory.
    #[must_use]
    pub fn basedir(&self) -> &Path {
        &self.basedir
    }

    /// Returns the sorted observation names of the study.
    #[must_use]
    pub fn observation_names(&self) -> &[String] {
        self.coordinator.spec().observation_names()
    }

    /// Returns the length of result vectors (1 for scalar objectives).
    #[must_use]
    pub fn num_residuals(&self) -> usize {
        match self.kind {
            PayloadKind::Misfit => 1,
            PayloadKind::Residual => match self.residual_len.load(Ordering::Relaxed) {
                0 => DEFAULT_RESIDUAL_LEN,
                len => len,
            },
            PayloadKind::SimObs => self.observation_names().len(),
        }
    }

    /// Returns the lower bounds of the active parameters.
    #[must_use]
    pub fn lower_bounds(&self) -> Vec<f64> {
        self.coordinator.spec().parameters().lower_bounds()
    }

    /// Returns the upper bounds of the active parameters.
    #[must_use]
    pub fn upper_bounds(&self) -> Vec<f64> {
        self.coordinator.spec().parameters().upper_bounds()
    }

    // ------------------------------------------------------------------------
    // Optimizer Surface
    // ------------------------------------------------------------------------

    /// Evaluates the objective at `x` in the default scenario.
    ///
    /// `x` holds either every parameter or only the active ones, in
    /// sorted-name order. `gradient` must be empty.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectiveError::GradientNotSupported`] for a non-empty
    /// gradient buffer and [`ObjectiveError`] when the lookup fails.
    pub fn evaluate(
        &self,
        x: &[f64],
        gradient: &[f64],
    ) -> Result<Evaluation<ObjectiveValue>, ObjectiveError> {
        if !gradient.is_empty() {
            return Err(ObjectiveError::GradientNotSupported(gradient.len()));
        }
        let values = self.coordinator.spec().parameters().values_to_params(x)?;
        self.result(&values, None)
    }

    /// Looks up the result for a parameter mapping.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectiveError`] when the lookup fails or a stored payload
    /// cannot be read.
    pub fn result(
        &self,
        values: &ParameterValues,
        scenario: Option<&str>,
    ) -> Result<Evaluation<ObjectiveValue>, ObjectiveError> {
        match self.coordinator.lookup(values, scenario)? {
            LookupOutcome::PreliminaryRun {
                ..
            } => Ok(Evaluation::PreliminaryRun),
            LookupOutcome::NewRun {
                ..
            } => Ok(Evaluation::NewRun),
            LookupOutcome::Waiting => Ok(Evaluation::Waiting),
            LookupOutcome::Pending {
                ..
            } => Ok(Evaluation::Placeholder(self.placeholder())),
            LookupOutcome::Completed {
                run_id,
                result,
            } => self.read_value(run_id, &result).map(Evaluation::Value),
        }
    }

    /// Looks up the simulated observations for a parameter mapping.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectiveError::KindMismatch`] unless the objective kind is
    /// `simobs`, and [`ObjectiveError`] when the lookup or the read fails.
    pub fn named_series(
        &self,
        values: &ParameterValues,
        scenario: Option<&str>,
    ) -> Result<Evaluation<BTreeMap<String, f64>>, ObjectiveError> {
        self.require_kind(PayloadKind::SimObs)?;
        match self.coordinator.lookup(values, scenario)? {
            LookupOutcome::PreliminaryRun {
                ..
            } => Ok(Evaluation::PreliminaryRun),
            LookupOutcome::NewRun {
                ..
            } => Ok(Evaluation::NewRun),
            LookupOutcome::Waiting => Ok(Evaluation::Waiting),
            LookupOutcome::Pending {
                ..
            } => Ok(Evaluation::Placeholder(
                self.observation_names()
                    .iter()
                    .map(|name| (name.clone(), rand::random::<f64>()))
                    .collect(),
            )),
            LookupOutcome::Completed {
                run_id,
                result,
            } => self.read_series(run_id, &result).map(Evaluation::Value),
        }
    }

    // ------------------------------------------------------------------------
    // Worker Surface
    // ------------------------------------------------------------------------

    /// Deposits the result of an `Active` run.
    ///
    /// Vector payloads are written to a file named from the run id before the
    /// run is marked `Completed`. `force` bypasses the state check.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectiveError::KindMismatch`] when the payload kind differs
    /// from the objective kind, [`ObjectiveError::ObservationMismatch`] for
    /// mismatched observation names and [`ObjectiveError::Coordinator`] when
    /// the run is missing, in the wrong state or the file cannot be written.
    pub fn deposit(
        &self,
        values: &ParameterValues,
        payload: &ResultPayload,
        scenario: Option<&str>,
        force: bool,
    ) -> Result<RunId, ObjectiveError> {
        self.require_kind(payload.kind())?;
        if let ResultPayload::NamedSeries(series) = payload {
            self.check_series(series)?;
        }
        let run_id = self.coordinator.complete_with(values, scenario, force, |run| {
            self.store_payload(run.run_id, payload)
        })?;
        Ok(run_id)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Fails unless the objective kind is `kind`.
    fn require_kind(&self, kind: PayloadKind) -> Result<(), ObjectiveError> {
        if kind == self.kind {
            Ok(())
        } else {
            Err(ObjectiveError::KindMismatch {
                expected: self.kind,
                actual: kind,
            })
        }
    }

    /// Builds a random placeholder of the objective's shape.
    fn placeholder(&self) -> ObjectiveValue {
        match self.kind {
            PayloadKind::Misfit => ObjectiveValue::Scalar(rand::random::<f64>()),
            PayloadKind::Residual | PayloadKind::SimObs => ObjectiveValue::Vector(
                (0 .. self.num_residuals()).map(|_| rand::random::<f64>()).collect(),
            ),
        }
    }

    /// Persists a payload and returns the result to record on the run.
    fn store_payload(
        &self,
        run_id: RunId,
        payload: &ResultPayload,
    ) -> Result<StoredResult, CoordinatorError> {
        let bytes = match payload {
            ResultPayload::Scalar(value) => return Ok(StoredResult::Scalar(*value)),
            ResultPayload::Residuals(residuals) => serde_json::to_vec(residuals),
            ResultPayload::NamedSeries(series) => serde_json::to_vec(series),
        }
        .map_err(|err| CoordinatorError::Payload(err.to_string()))?;
        let file_name = payload.kind().file_name(run_id).ok_or_else(|| {
            CoordinatorError::Payload(format!("{} payloads are stored inline", payload.kind()))
        })?;
        fs::create_dir_all(&self.basedir)
            .map_err(|err| CoordinatorError::Payload(err.to_string()))?;
        let path = self.basedir.join(file_name);
        fs::write(&path, bytes).map_err(|err| {
            CoordinatorError::Payload(format!("failed to write {}: {err}", path.display()))
        })?;
        debug!(run_id = %run_id, path = %path.display(), "wrote payload file");
        Ok(StoredResult::FileRef(path))
    }

    /// Reads the optimizer value of a completed run.
    fn read_value(
        &self,
        run_id: RunId,
        result: &StoredResult,
    ) -> Result<ObjectiveValue, ObjectiveError> {
        match (self.kind, result) {
            (PayloadKind::Misfit, StoredResult::Scalar(value)) => Ok(ObjectiveValue::Scalar(*value)),
            (PayloadKind::Residual, StoredResult::FileRef(path)) => {
                let residuals: Vec<f64> = read_payload_file(path)?;
                let _ = self.residual_len.compare_exchange(
                    0,
                    residuals.len(),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                );
                Ok(ObjectiveValue::Vector(residuals))
            }
            (PayloadKind::SimObs, StoredResult::FileRef(_)) => {
                let series = self.read_series(run_id, result)?;
                Ok(ObjectiveValue::Vector(series.into_values().collect()))
            }
            _ => Err(ObjectiveError::StoredResultMismatch {
                run_id,
                kind: self.kind,
            }),
        }
    }

    /// Reads and validates the named series of a completed run.
    fn read_series(
        &self,
        run_id: RunId,
        result: &StoredResult,
    ) -> Result<BTreeMap<String, f64>, ObjectiveError> {
        let StoredResult::FileRef(path) = result else {
            return Err(ObjectiveError::StoredResultMismatch {
                run_id,
                kind: self.kind,
            });
        };
        let series: BTreeMap<String, f64> = read_payload_file(path)?;
        self.check_series(&series)?;
        Ok(series)
    }

    /// Checks that a series is keyed by exactly the study's observation names.
    fn check_series(&self, series: &BTreeMap<String, f64>) -> Result<(), ObjectiveError> {
        let expected = self.observation_names();
        let mut problems = Vec::new();
        for name in expected {
            if !series.contains_key(name) {
                problems.push(format!("observation {name} missing"));
            }
        }
        for name in series.keys() {
            if expected.binary_search(name).is_err() {
                problems.push(format!("unexpected observation {name}"));
            }
        }
        if problems.is_empty() {
            return Ok(());
        }
        for problem in &problems {
            error!("{problem}");
        }
        Err(ObjectiveError::ObservationMismatch(problems.join("; ")))
    }
}

/// Reads a JSON payload file with a size limit.
fn read_payload_file<T: DeserializeOwned>(path: &Path) -> Result<T, ObjectiveError> {
    let failure = |message: String| ObjectiveError::PayloadFile {
        path: path.display().to_string(),
        message,
    };
    let metadata = fs::metadata(path).map_err(|err| failure(err.to_string()))?;
    if metadata.len() > MAX_PAYLOAD_BYTES {
        return Err(failure(format!(
            "file exceeds size limit: {} bytes (max {MAX_PAYLOAD_BYTES})",
            metadata.len()
        )));
    }
    let bytes = fs::read(path).map_err(|err| failure(err.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|err| failure(err.to_string()))
}

#[cfg(test)]
mod tests;
