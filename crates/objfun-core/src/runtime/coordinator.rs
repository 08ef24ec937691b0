// crates/objfun-core/src/runtime/coordinator.rs
// ============================================================================
// Module: Lookup Coordinator
// Description: Run state machine arbitrating between the optimizer and workers.
// Purpose: Resolve lookups, hand out pending runs and ingest results atomically.
// Dependencies: crate::core, crate::interfaces, thiserror, tracing
// ============================================================================

//! ## Overview
//! The coordinator owns a store handle and the definition of one study. Every
//! operation quantizes its input, resolves a scenario and then runs as a
//! single store transaction: the read and the conditional write commit
//! together, so concurrent optimizer and worker processes sharing the store
//! never observe half-applied transitions.
//!
//! Lookup state machine, per scenario:
//! - miss, no provisional run: create a `Provisional` run, signal
//!   [`LookupOutcome::PreliminaryRun`];
//! - miss while another run is `Provisional`: delete that run, signal
//!   [`LookupOutcome::Waiting`];
//! - hit on a `Provisional` run: promote it to `New`, signal
//!   [`LookupOutcome::NewRun`];
//! - hit on a `Completed` run: return the stored result;
//! - any other hit: [`LookupOutcome::Pending`].
//!
//! With the preliminary pass disabled, misses create `New` runs directly.
//! Alternating between two candidate vectors therefore never schedules
//! either of them; callers are expected to repeat a vector to confirm it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::core::identifiers::RunId;
use crate::core::identifiers::ScenarioId;
use crate::core::identifiers::StudyId;
use crate::core::payload::StoredResult;
use crate::core::state::RunState;
use crate::core::study::ParameterValues;
use crate::core::study::QuantizedKey;
use crate::core::study::StudyError;
use crate::core::study::StudySpec;
use crate::interfaces::LookupStore;
use crate::interfaces::RunRecord;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Result of a coordinator lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    /// First sighting of the vector; a provisional run was reserved.
    PreliminaryRun {
        /// Reserved run.
        run_id: RunId,
    },
    /// A run was scheduled and now awaits a worker.
    NewRun {
        /// Scheduled run.
        run_id: RunId,
    },
    /// A stale provisional run was discarded; nothing was scheduled.
    Waiting,
    /// The run exists but has no result yet.
    Pending {
        /// Matching run.
        run_id: RunId,
        /// Current state of the run.
        state: RunState,
    },
    /// The run is complete.
    Completed {
        /// Matching run.
        run_id: RunId,
        /// Stored result.
        result: StoredResult,
    },
}

/// Run handed to a worker by a claim.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedRun {
    /// Claimed run.
    pub run_id: RunId,
    /// Dequantized parameter values of the run.
    pub parameters: ParameterValues,
}

/// Result of a claim.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// A run was claimed.
    Claimed(ClaimedRun),
    /// No run is in the requested state.
    NoPendingWork,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Coordinator errors.
///
/// Control-flow signals are reported through [`LookupOutcome`] and
/// [`ClaimOutcome`], never through this type.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Parameter values could not be converted.
    #[error(transparent)]
    Study(#[from] StudyError),
    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The study definition differs from the stored study.
    #[error("configuration of study {study} does not match the store: {details}")]
    ConfigMismatch {
        /// Study name.
        study: String,
        /// Mismatch descriptions joined by `; `.
        details: String,
    },
    /// No run matches the parameter values.
    #[error("no run matches the parameter values")]
    NotFound,
    /// A run identifier does not exist.
    #[error("run {0} does not exist")]
    RunNotFound(RunId),
    /// A named scenario does not exist.
    #[error("scenario {0} does not exist")]
    ScenarioNotFound(String),
    /// No scenario was named and no default is selected.
    #[error("no scenario given and no default scenario selected")]
    NoScenario,
    /// The run is not in the state the operation requires.
    #[error("run {run_id} is {actual}, expected {expected}")]
    WrongState {
        /// Affected run.
        run_id: RunId,
        /// Required state.
        expected: RunState,
        /// Actual state.
        actual: RunState,
    },
    /// A result payload could not be produced.
    #[error("result payload error: {0}")]
    Payload(String),
}

// ============================================================================
// SECTION: Coordinator
// ============================================================================

/// Lookup-table coordinator bound to one study.
#[derive(Debug)]
pub struct LookupCoordinator<S> {
    /// Store handle.
    store: S,
    /// Study definition validated against the store.
    spec: StudySpec,
    /// Stored study identifier.
    study_id: StudyId,
    /// Default scenario name and identifier.
    default_scenario: Option<(String, ScenarioId)>,
    /// Reserve provisional runs before scheduling new ones.
    preliminary: bool,
}

impl<S: LookupStore> LookupCoordinator<S> {
    /// Opens the study described by `spec`, creating it if absent.
    ///
    /// The preliminary pass is enabled and no default scenario is selected.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::ConfigMismatch`] when the stored study
    /// differs from `spec`; every difference is logged at error level.
    pub fn open(store: S, spec: StudySpec) -> Result<Self, CoordinatorError> {
        let record = store.open_study(&spec)?;
        if record.created {
            info!(study = spec.name(), study_id = %record.study_id, "created study");
        } else {
            let mismatches = spec.mismatches(&record.definitions, &record.observation_names);
            if !mismatches.is_empty() {
                for mismatch in &mismatches {
                    error!(study = spec.name(), "{mismatch}");
                }
                return Err(CoordinatorError::ConfigMismatch {
                    study: spec.name().to_string(),
                    details: mismatches.join("; "),
                });
            }
            debug!(study = spec.name(), study_id = %record.study_id, "loaded study");
        }
        Ok(Self {
            store,
            spec,
            study_id: record.study_id,
            default_scenario: None,
            preliminary: true,
        })
    }

    /// Enables or disables the preliminary pass.
    #[must_use]
    pub const fn with_preliminary(mut self, preliminary: bool) -> Self {
        self.preliminary = preliminary;
        self
    }

    /// Returns the study definition.
    #[must_use]
    pub const fn spec(&self) -> &StudySpec {
        &self.spec
    }

    /// Returns the stored study identifier.
    #[must_use]
    pub const fn study_id(&self) -> StudyId {
        self.study_id
    }

    /// Returns the store handle.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns true when the preliminary pass is enabled.
    #[must_use]
    pub const fn preliminary(&self) -> bool {
        self.preliminary
    }

    /// Returns the name of the default scenario.
    #[must_use]
    pub fn default_scenario(&self) -> Option<&str> {
        self.default_scenario.as_ref().map(|(name, _)| name.as_str())
    }

    // ------------------------------------------------------------------------
    // Scenarios
    // ------------------------------------------------------------------------

    /// Selects the default scenario, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError`] when the scenario cannot be created.
    pub fn set_default_scenario(&mut self, name: &str) -> Result<ScenarioId, CoordinatorError> {
        let scenario_id = self.select_scenario(name, true)?;
        self.default_scenario = Some((name.to_string(), scenario_id));
        Ok(scenario_id)
    }

    /// Resolves a scenario by name, creating it when `create` is set.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::ScenarioNotFound`] when the scenario does
    /// not exist and `create` is not set.
    pub fn select_scenario(&self, name: &str, create: bool) -> Result<ScenarioId, CoordinatorError> {
        let scenario_id = self
            .store
            .scenario(self.study_id, name, create)?
            .ok_or_else(|| CoordinatorError::ScenarioNotFound(name.to_string()))?;
        debug!(scenario = name, scenario_id = %scenario_id, "selected scenario");
        Ok(scenario_id)
    }

    /// Lists the scenario names of the study.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Store`] when the store fails.
    pub fn scenarios(&self) -> Result<Vec<String>, CoordinatorError> {
        Ok(self.store.scenarios(self.study_id)?)
    }

    /// Resolves an explicit scenario (which must exist) or the default.
    fn resolve_scenario(&self, scenario: Option<&str>) -> Result<ScenarioId, CoordinatorError> {
        match scenario {
            Some(name) => self.select_scenario(name, false),
            None => self
                .default_scenario
                .as_ref()
                .map(|(_, scenario_id)| *scenario_id)
                .ok_or(CoordinatorError::NoScenario),
        }
    }

    /// Quantizes the values and resolves the scenario.
    fn locate(
        &self,
        values: &ParameterValues,
        scenario: Option<&str>,
    ) -> Result<(ScenarioId, QuantizedKey), CoordinatorError> {
        let key = self.spec.parameters().quantize(values)?;
        Ok((self.resolve_scenario(scenario)?, key))
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    /// Looks up a parameter vector, reserving or scheduling a run on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError`] when the values cannot be quantized, the
    /// scenario cannot be resolved or the store fails.
    pub fn lookup(
        &self,
        values: &ParameterValues,
        scenario: Option<&str>,
    ) -> Result<LookupOutcome, CoordinatorError> {
        let (scenario_id, key) = self.locate(values, scenario)?;
        self.lookup_key(scenario_id, &key)
    }

    /// Looks up a quantized key in a resolved scenario.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Store`] when the store fails or a completed
    /// run carries no result.
    pub fn lookup_key(
        &self,
        scenario_id: ScenarioId,
        key: &QuantizedKey,
    ) -> Result<LookupOutcome, CoordinatorError> {
        self.store.transaction(|tx| -> Result<LookupOutcome, CoordinatorError> {
            if let Some(run) = tx.find_run(scenario_id, key)? {
                return match run.state {
                    RunState::Provisional => {
                        tx.set_state(run.run_id, RunState::New)?;
                        info!(run_id = %run.run_id, scenario_id = %scenario_id, "scheduled provisional run");
                        Ok(LookupOutcome::NewRun {
                            run_id: run.run_id,
                        })
                    }
                    RunState::Completed => {
                        let result = run.result.ok_or_else(|| {
                            StoreError::Corrupt(format!("completed run {} has no result", run.run_id))
                        })?;
                        debug!(run_id = %run.run_id, "lookup hit");
                        Ok(LookupOutcome::Completed {
                            run_id: run.run_id,
                            result,
                        })
                    }
                    state => {
                        debug!(run_id = %run.run_id, state = %state, "lookup hit on pending run");
                        Ok(LookupOutcome::Pending {
                            run_id: run.run_id,
                            state,
                        })
                    }
                };
            }
            if let Some(stale) = tx.first_run_in_state(scenario_id, RunState::Provisional)? {
                tx.delete_run(stale.run_id)?;
                info!(run_id = %stale.run_id, scenario_id = %scenario_id, "discarded provisional run");
                return Ok(LookupOutcome::Waiting);
            }
            if !self.preliminary {
                let run_id = tx.insert_run(scenario_id, key, RunState::New)?;
                info!(run_id = %run_id, scenario_id = %scenario_id, "scheduled new run");
                return Ok(LookupOutcome::NewRun {
                    run_id,
                });
            }
            let run_id = tx.insert_run(scenario_id, key, RunState::Provisional)?;
            info!(run_id = %run_id, scenario_id = %scenario_id, "reserved provisional run");
            Ok(LookupOutcome::PreliminaryRun {
                run_id,
            })
        })
    }

    // ------------------------------------------------------------------------
    // Claims
    // ------------------------------------------------------------------------

    /// Claims the lowest-id `New` run and marks it `Active`.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError`] when the scenario cannot be resolved or the
    /// store fails.
    pub fn claim_next(&self, scenario: Option<&str>) -> Result<ClaimOutcome, CoordinatorError> {
        self.claim_with_state(scenario, RunState::New, RunState::Active)
    }

    /// Claims the lowest-id run in state `from` and moves it to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError`] when the scenario cannot be resolved, the
    /// run keys cannot be decoded or the store fails.
    pub fn claim_with_state(
        &self,
        scenario: Option<&str>,
        from: RunState,
        to: RunState,
    ) -> Result<ClaimOutcome, CoordinatorError> {
        let scenario_id = self.resolve_scenario(scenario)?;
        self.store.transaction(|tx| -> Result<ClaimOutcome, CoordinatorError> {
            let Some(run) = tx.first_run_in_state(scenario_id, from)? else {
                debug!(scenario_id = %scenario_id, state = %from, "no pending work");
                return Ok(ClaimOutcome::NoPendingWork);
            };
            let parameters = self.spec.parameters().dequantize(&run.key)?;
            tx.set_state(run.run_id, to)?;
            info!(run_id = %run.run_id, from = %from, to = %to, "claimed run");
            Ok(ClaimOutcome::Claimed(ClaimedRun {
                run_id: run.run_id,
                parameters,
            }))
        })
    }

    // ------------------------------------------------------------------------
    // Results
    // ------------------------------------------------------------------------

    /// Records a result for an `Active` run and marks it `Completed`.
    ///
    /// `force` bypasses the state check.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::NotFound`] when no run matches and
    /// [`CoordinatorError::WrongState`] when the run is not `Active`.
    pub fn deposit(
        &self,
        values: &ParameterValues,
        scenario: Option<&str>,
        result: StoredResult,
        force: bool,
    ) -> Result<RunId, CoordinatorError> {
        self.complete_with(values, scenario, force, |_| Ok(result))
    }

    /// Completes the matching run with a result built from the run record.
    ///
    /// `build` runs inside the transaction after the state check, so payload
    /// files can be named from the run id; a failing `build` rolls back.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::NotFound`] when no run matches,
    /// [`CoordinatorError::WrongState`] when the run is not `Active` and
    /// `force` is not set, or the error returned by `build`.
    pub fn complete_with<F>(
        &self,
        values: &ParameterValues,
        scenario: Option<&str>,
        force: bool,
        build: F,
    ) -> Result<RunId, CoordinatorError>
    where
        F: FnOnce(&RunRecord) -> Result<StoredResult, CoordinatorError>,
    {
        let (scenario_id, key) = self.locate(values, scenario)?;
        self.store.transaction(|tx| -> Result<RunId, CoordinatorError> {
            let run = tx.find_run(scenario_id, &key)?.ok_or(CoordinatorError::NotFound)?;
            if !force && run.state != RunState::Active {
                return Err(CoordinatorError::WrongState {
                    run_id: run.run_id,
                    expected: RunState::Active,
                    actual: run.state,
                });
            }
            let result = build(&run)?;
            tx.set_result(run.run_id, &result)?;
            tx.set_state(run.run_id, RunState::Completed)?;
            info!(run_id = %run.run_id, forced = force, "completed run");
            Ok(run.run_id)
        })
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Returns the run matching the parameter values.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::NotFound`] when no run matches.
    pub fn run(
        &self,
        values: &ParameterValues,
        scenario: Option<&str>,
    ) -> Result<RunRecord, CoordinatorError> {
        let (scenario_id, key) = self.locate(values, scenario)?;
        self.store.transaction(|tx| -> Result<RunRecord, CoordinatorError> {
            tx.find_run(scenario_id, &key)?.ok_or(CoordinatorError::NotFound)
        })
    }

    /// Returns the state of the run matching the parameter values.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::NotFound`] when no run matches.
    pub fn run_state(
        &self,
        values: &ParameterValues,
        scenario: Option<&str>,
    ) -> Result<RunState, CoordinatorError> {
        Ok(self.run(values, scenario)?.state)
    }

    /// Returns the id of the run matching the parameter values.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::NotFound`] when no run matches.
    pub fn run_id(
        &self,
        values: &ParameterValues,
        scenario: Option<&str>,
    ) -> Result<RunId, CoordinatorError> {
        Ok(self.run(values, scenario)?.run_id)
    }

    /// Sets the state of a run by id.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::RunNotFound`] for unknown ids.
    pub fn set_state(&self, run_id: RunId, state: RunState) -> Result<(), CoordinatorError> {
        self.store.transaction(|tx| -> Result<(), CoordinatorError> {
            let run = tx.run(run_id)?.ok_or(CoordinatorError::RunNotFound(run_id))?;
            tx.set_state(run_id, state)?;
            info!(run_id = %run_id, from = %run.state, to = %state, "set run state");
            Ok(())
        })
    }

    /// Returns the dequantized parameter values of a run.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::RunNotFound`] for unknown ids.
    pub fn run_parameters(&self, run_id: RunId) -> Result<ParameterValues, CoordinatorError> {
        let run = self.store.transaction(|tx| -> Result<RunRecord, CoordinatorError> {
            tx.run(run_id)?.ok_or(CoordinatorError::RunNotFound(run_id))
        })?;
        Ok(self.spec.parameters().dequantize(&run.key)?)
    }
}

#[cfg(test)]
mod tests;
