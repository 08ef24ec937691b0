// crates/objfun-core/src/runtime/store.rs
// ============================================================================
// Module: In-Memory Lookup Store
// Description: Simple in-memory lookup store for tests and embedding.
// Purpose: Provide a transactional store implementation without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! This module provides an in-memory implementation of [`LookupStore`]. Each
//! transaction holds the store mutex for its whole duration and works on a
//! copy of the state, which replaces the shared state only when the closure
//! succeeds. Clones share the same state, so a clone handed to another thread
//! behaves like a second connection to the same database.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::core::identifiers::RunId;
use crate::core::identifiers::ScenarioId;
use crate::core::identifiers::StudyId;
use crate::core::parameter::ParameterDefinition;
use crate::core::payload::StoredResult;
use crate::core::state::RunState;
use crate::core::study::QuantizedKey;
use crate::core::study::StudySpec;
use crate::interfaces::LookupStore;
use crate::interfaces::RunRecord;
use crate::interfaces::StoreError;
use crate::interfaces::StoreTransaction;
use crate::interfaces::StudyRecord;

// ============================================================================
// SECTION: State
// ============================================================================

/// Stored study definition.
#[derive(Debug, Clone)]
struct MemoryStudy {
    /// Study name.
    name: String,
    /// Parameter definitions in sorted-name order.
    definitions: Vec<(String, ParameterDefinition)>,
    /// Observation names.
    observation_names: Vec<String>,
}

/// Stored scenario.
#[derive(Debug, Clone)]
struct MemoryScenario {
    /// Owning study.
    study_id: StudyId,
    /// Scenario name.
    name: String,
}

/// Complete store contents.
#[derive(Debug, Clone, Default)]
struct MemoryState {
    /// Studies keyed by raw identifier.
    studies: BTreeMap<u64, MemoryStudy>,
    /// Scenarios keyed by raw identifier.
    scenarios: BTreeMap<u64, MemoryScenario>,
    /// Runs keyed by raw identifier.
    runs: BTreeMap<u64, RunRecord>,
    /// Highest run identifier ever issued.
    last_run_id: u64,
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory lookup store for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLookupStore {
    /// Store contents protected by a mutex.
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryLookupStore {
    /// Creates a new, empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` with the store contents locked.
    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut MemoryState) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| StoreError::Store("lookup store mutex poisoned".to_string()))?;
        f(&mut guard)
    }
}

impl LookupStore for InMemoryLookupStore {
    fn open_study(&self, spec: &StudySpec) -> Result<StudyRecord, StoreError> {
        self.with_state(|state| {
            if let Some((raw, study)) =
                state.studies.iter().find(|(_, study)| study.name == spec.name())
            {
                return Ok(StudyRecord {
                    study_id: study_id(*raw)?,
                    definitions: study.definitions.clone(),
                    observation_names: study.observation_names.clone(),
                    created: false,
                });
            }
            let raw = next_id(state.studies.keys().next_back().copied())?;
            let study = MemoryStudy {
                name: spec.name().to_string(),
                definitions: spec.parameters().definitions(),
                observation_names: spec.observation_names().to_vec(),
            };
            let record = StudyRecord {
                study_id: study_id(raw)?,
                definitions: study.definitions.clone(),
                observation_names: study.observation_names.clone(),
                created: true,
            };
            state.studies.insert(raw, study);
            Ok(record)
        })
    }

    fn scenario(
        &self,
        study_id: StudyId,
        name: &str,
        create: bool,
    ) -> Result<Option<ScenarioId>, StoreError> {
        self.with_state(|state| {
            if !state.studies.contains_key(&study_id.get()) {
                return Err(StoreError::Invalid(format!("unknown study {study_id}")));
            }
            if let Some(raw) = state
                .scenarios
                .iter()
                .find(|(_, scenario)| scenario.study_id == study_id && scenario.name == name)
                .map(|(raw, _)| *raw)
            {
                return scenario_id(raw).map(Some);
            }
            if !create {
                return Ok(None);
            }
            let raw = next_id(state.scenarios.keys().next_back().copied())?;
            state.scenarios.insert(
                raw,
                MemoryScenario {
                    study_id,
                    name: name.to_string(),
                },
            );
            scenario_id(raw).map(Some)
        })
    }

    fn scenarios(&self, study_id: StudyId) -> Result<Vec<String>, StoreError> {
        self.with_state(|state| {
            let mut names: Vec<String> = state
                .scenarios
                .values()
                .filter(|scenario| scenario.study_id == study_id)
                .map(|scenario| scenario.name.clone())
                .collect();
            names.sort();
            Ok(names)
        })
    }

    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T, E>,
    {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| StoreError::Store("lookup store mutex poisoned".to_string()))?;
        let mut tx = MemoryTransaction {
            state: guard.clone(),
        };
        let value = f(&mut tx)?;
        *guard = tx.state;
        Ok(value)
    }
}

// ============================================================================
// SECTION: Transactions
// ============================================================================

/// Working copy of the store contents for one transaction.
struct MemoryTransaction {
    /// Uncommitted store contents.
    state: MemoryState,
}

impl MemoryTransaction {
    /// Returns a mutable run or an invalid-request error.
    fn run_mut(&mut self, run_id: RunId) -> Result<&mut RunRecord, StoreError> {
        self.state
            .runs
            .get_mut(&run_id.get())
            .ok_or_else(|| StoreError::Invalid(format!("unknown run {run_id}")))
    }
}

impl StoreTransaction for MemoryTransaction {
    fn find_run(
        &mut self,
        scenario_id: ScenarioId,
        key: &QuantizedKey,
    ) -> Result<Option<RunRecord>, StoreError> {
        Ok(self
            .state
            .runs
            .values()
            .find(|run| run.scenario_id == scenario_id && run.key == *key)
            .cloned())
    }

    fn first_run_in_state(
        &mut self,
        scenario_id: ScenarioId,
        state: RunState,
    ) -> Result<Option<RunRecord>, StoreError> {
        Ok(self
            .state
            .runs
            .values()
            .find(|run| run.scenario_id == scenario_id && run.state == state)
            .cloned())
    }

    fn run(&mut self, run_id: RunId) -> Result<Option<RunRecord>, StoreError> {
        Ok(self.state.runs.get(&run_id.get()).cloned())
    }

    fn insert_run(
        &mut self,
        scenario_id: ScenarioId,
        key: &QuantizedKey,
        state: RunState,
    ) -> Result<RunId, StoreError> {
        if !self.state.scenarios.contains_key(&scenario_id.get()) {
            return Err(StoreError::Invalid(format!("unknown scenario {scenario_id}")));
        }
        let raw = next_id(Some(self.state.last_run_id))?;
        let run_id = RunId::from_raw(raw)
            .ok_or_else(|| StoreError::Store("run id out of range".to_string()))?;
        self.state.last_run_id = raw;
        self.state.runs.insert(
            raw,
            RunRecord {
                run_id,
                scenario_id,
                state,
                key: key.clone(),
                result: None,
            },
        );
        Ok(run_id)
    }

    fn delete_run(&mut self, run_id: RunId) -> Result<(), StoreError> {
        self.state.runs.remove(&run_id.get());
        Ok(())
    }

    fn set_state(&mut self, run_id: RunId, state: RunState) -> Result<(), StoreError> {
        self.run_mut(run_id)?.state = state;
        Ok(())
    }

    fn set_result(&mut self, run_id: RunId, result: &StoredResult) -> Result<(), StoreError> {
        self.run_mut(run_id)?.result = Some(result.clone());
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the identifier following `last` (1 when nothing was issued).
fn next_id(last: Option<u64>) -> Result<u64, StoreError> {
    last.unwrap_or(0)
        .checked_add(1)
        .ok_or_else(|| StoreError::Store("identifier space exhausted".to_string()))
}

/// Converts a raw study identifier.
fn study_id(raw: u64) -> Result<StudyId, StoreError> {
    StudyId::from_raw(raw).ok_or_else(|| StoreError::Corrupt("zero study id".to_string()))
}

/// Converts a raw scenario identifier.
fn scenario_id(raw: u64) -> Result<ScenarioId, StoreError> {
    ScenarioId::from_raw(raw).ok_or_else(|| StoreError::Corrupt("zero scenario id".to_string()))
}
