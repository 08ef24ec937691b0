// crates/objfun-core/src/lib.rs
// ============================================================================
// Module: Objective Function Core
// Description: Parameter codec, lookup coordinator and objective adapters.
// Purpose: Decouple a derivative-free optimizer from externally scheduled model runs.
// Dependencies: rand, serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! The optimizer calls [`ObjectiveFunction::evaluate`] synchronously on every
//! iteration. Values are looked up by quantized parameter key in a persistent
//! lookup table; misses create pending runs that external workers claim with
//! [`LookupCoordinator::claim_next`] and complete with
//! [`ObjectiveFunction::deposit`]. Until a run completes the optimizer receives
//! a control-flow signal or a placeholder value.
//! Invariants:
//! - Within a scenario, each quantized key maps to at most one run.
//! - At most one provisional run exists per scenario.
//! - Every coordinator operation runs inside one store transaction.
//!
//! Storage backends implement [`LookupStore`]; this crate ships the
//! in-memory [`InMemoryLookupStore`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::identifiers::RunId;
pub use crate::core::identifiers::ScenarioId;
pub use crate::core::identifiers::StudyId;
pub use crate::core::parameter::ContinuousParameter;
pub use crate::core::parameter::DEFAULT_RESOLUTION;
pub use crate::core::parameter::IntegerParameter;
pub use crate::core::parameter::Parameter;
pub use crate::core::parameter::ParameterDefinition;
pub use crate::core::parameter::ParameterError;
pub use crate::core::parameter::ParameterKind;
pub use crate::core::payload::ObjectiveValue;
pub use crate::core::payload::PayloadKind;
pub use crate::core::payload::ResultPayload;
pub use crate::core::payload::StoredResult;
pub use crate::core::state::RunState;
pub use crate::core::state::UnknownRunState;
pub use crate::core::study::ParameterSet;
pub use crate::core::study::ParameterValues;
pub use crate::core::study::QuantizedKey;
pub use crate::core::study::StudyError;
pub use crate::core::study::StudySpec;
pub use crate::interfaces::LookupStore;
pub use crate::interfaces::RunRecord;
pub use crate::interfaces::StoreError;
pub use crate::interfaces::StoreTransaction;
pub use crate::interfaces::StudyRecord;
pub use crate::runtime::coordinator::ClaimOutcome;
pub use crate::runtime::coordinator::ClaimedRun;
pub use crate::runtime::coordinator::CoordinatorError;
pub use crate::runtime::coordinator::LookupCoordinator;
pub use crate::runtime::coordinator::LookupOutcome;
pub use crate::runtime::objective::DEFAULT_RESIDUAL_LEN;
pub use crate::runtime::objective::Evaluation;
pub use crate::runtime::objective::ObjectiveError;
pub use crate::runtime::objective::ObjectiveFunction;
pub use crate::runtime::store::InMemoryLookupStore;
