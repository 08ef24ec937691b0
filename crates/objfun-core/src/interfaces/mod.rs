// crates/objfun-core/src/interfaces/mod.rs
// ============================================================================
// Module: Lookup Store Interfaces
// Description: Backend-agnostic persistence contract for the lookup table.
// Purpose: Define the transactional surface the coordinator runs against.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! A [`LookupStore`] persists studies, scenarios and runs. Every coordinator
//! operation runs inside [`LookupStore::transaction`], which hands the closure
//! a [`StoreTransaction`] holding an exclusive write lock on the store; the
//! transaction commits when the closure returns `Ok` and rolls back otherwise.
//!
//! Stored data is untrusted on load: implementations report unreadable rows as
//! [`StoreError::Corrupt`] or [`StoreError::Invalid`] instead of guessing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::identifiers::RunId;
use crate::core::identifiers::ScenarioId;
use crate::core::identifiers::StudyId;
use crate::core::parameter::ParameterDefinition;
use crate::core::payload::StoredResult;
use crate::core::state::RunState;
use crate::core::study::QuantizedKey;
use crate::core::study::StudySpec;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Lookup store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("lookup store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("lookup store corruption: {0}")]
    Corrupt(String),
    /// Store schema version is incompatible.
    #[error("lookup store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data or request is invalid.
    #[error("lookup store invalid data: {0}")]
    Invalid(String),
    /// Store reported an error.
    #[error("lookup store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// Study as persisted by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StudyRecord {
    /// Study identifier.
    pub study_id: StudyId,
    /// Stored parameter definitions in sorted-name order.
    pub definitions: Vec<(String, ParameterDefinition)>,
    /// Stored observation names.
    pub observation_names: Vec<String>,
    /// True when the study was created by this call.
    pub created: bool,
}

/// Run as persisted by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    /// Run identifier.
    pub run_id: RunId,
    /// Owning scenario.
    pub scenario_id: ScenarioId,
    /// Current state.
    pub state: RunState,
    /// Quantized keys in sorted-name order.
    pub key: QuantizedKey,
    /// Deposited result, once completed.
    pub result: Option<StoredResult>,
}

// ============================================================================
// SECTION: Transactions
// ============================================================================

/// Operations available inside a store transaction.
pub trait StoreTransaction {
    /// Finds the run in `scenario_id` whose key equals `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn find_run(
        &mut self,
        scenario_id: ScenarioId,
        key: &QuantizedKey,
    ) -> Result<Option<RunRecord>, StoreError>;

    /// Returns the lowest-id run in `scenario_id` with the given state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn first_run_in_state(
        &mut self,
        scenario_id: ScenarioId,
        state: RunState,
    ) -> Result<Option<RunRecord>, StoreError>;

    /// Loads a run by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn run(&mut self, run_id: RunId) -> Result<Option<RunRecord>, StoreError>;

    /// Inserts a run with its parameter keys and returns the new identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn insert_run(
        &mut self,
        scenario_id: ScenarioId,
        key: &QuantizedKey,
        state: RunState,
    ) -> Result<RunId, StoreError>;

    /// Deletes a run and its parameter keys.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    fn delete_run(&mut self, run_id: RunId) -> Result<(), StoreError>;

    /// Sets the state of a run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn set_state(&mut self, run_id: RunId, state: RunState) -> Result<(), StoreError>;

    /// Records the result of a run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn set_result(&mut self, run_id: RunId, result: &StoredResult) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Lookup Store
// ============================================================================

/// Persistent lookup table backend.
pub trait LookupStore {
    /// Loads the study named by `spec`, creating it with the spec's
    /// definitions if absent. Stored definitions are returned unvalidated.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the study cannot be read or created.
    fn open_study(&self, spec: &StudySpec) -> Result<StudyRecord, StoreError>;

    /// Resolves a scenario by name, creating it when `create` is set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query or insert fails.
    fn scenario(
        &self,
        study_id: StudyId,
        name: &str,
        create: bool,
    ) -> Result<Option<ScenarioId>, StoreError>;

    /// Lists the scenario names of a study in sorted order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn scenarios(&self, study_id: StudyId) -> Result<Vec<String>, StoreError>;

    /// Runs `f` inside an exclusive write transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back otherwise.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or [`StoreError`] converted into `E` when
    /// the transaction cannot begin or commit.
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T, E>;
}
