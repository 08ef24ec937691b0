// crates/objfun-core/src/runtime/coordinator/tests.rs
// ============================================================================
// Module: Lookup Coordinator Tests
// Description: Unit tests for the run state machine on the in-memory store.
// Purpose: Validate lookup signals, claims, deposits and scenario handling.
// Dependencies: objfun-core
// ============================================================================

//! ## Overview
//! Drives the coordinator through the provisional, new, active and completed
//! states and checks the signals returned at each step.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::float_cmp,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use super::ClaimOutcome;
use super::CoordinatorError;
use super::LookupCoordinator;
use super::LookupOutcome;
use crate::core::parameter::Parameter;
use crate::core::payload::StoredResult;
use crate::core::state::RunState;
use crate::core::study::ParameterSet;
use crate::core::study::ParameterValues;
use crate::core::study::StudySpec;
use crate::runtime::store::InMemoryLookupStore;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn spec() -> StudySpec {
    let parameters = ParameterSet::new([
        ("a", Parameter::continuous(-1.0, 1.0).unwrap()),
        ("b", Parameter::continuous_with_resolution(0.0, 2.0, 1e-7).unwrap()),
    ])
    .unwrap();
    StudySpec::new("S", parameters).unwrap()
}

fn coordinator() -> LookupCoordinator<InMemoryLookupStore> {
    let mut coordinator = LookupCoordinator::open(InMemoryLookupStore::new(), spec()).unwrap();
    coordinator.set_default_scenario("sc").unwrap();
    coordinator
}

fn params(a: f64, b: f64) -> ParameterValues {
    [("a".to_string(), a), ("b".to_string(), b)].into_iter().collect()
}

fn assert_close(actual: &ParameterValues, expected: &ParameterValues) {
    assert_eq!(actual.len(), expected.len());
    for (name, value) in expected {
        assert!((actual[name] - value).abs() < 1e-9, "{name}: {} != {value}", actual[name]);
    }
}

// ============================================================================
// SECTION: Lookup
// ============================================================================

#[test]
fn new_vector_goes_preliminary_then_new_then_pending() {
    let coordinator = coordinator();
    let p = params(0.0, 1.0);
    let first = coordinator.lookup(&p, None).unwrap();
    let LookupOutcome::PreliminaryRun {
        run_id,
    } = first
    else {
        panic!("expected preliminary run");
    };
    assert_eq!(coordinator.run_state(&p, None).unwrap(), RunState::Provisional);
    assert_eq!(
        coordinator.lookup(&p, None).unwrap(),
        LookupOutcome::NewRun {
            run_id
        }
    );
    assert_eq!(coordinator.run_state(&p, None).unwrap(), RunState::New);
    assert_eq!(
        coordinator.lookup(&p, None).unwrap(),
        LookupOutcome::Pending {
            run_id,
            state: RunState::New
        }
    );
}

#[test]
fn without_preliminary_misses_schedule_directly() {
    let coordinator = coordinator().with_preliminary(false);
    let p = params(0.5, 0.5);
    assert!(matches!(coordinator.lookup(&p, None).unwrap(), LookupOutcome::NewRun { .. }));
    assert_eq!(coordinator.run_state(&p, None).unwrap(), RunState::New);
    assert!(matches!(coordinator.lookup(&p, None).unwrap(), LookupOutcome::Pending { .. }));
}

#[test]
fn scheduling_without_preliminary_discards_stale_provisional_run() {
    let reserving = coordinator();
    assert!(reserving.preliminary());
    let stale = params(0.0, 1.0);
    assert!(matches!(
        reserving.lookup(&stale, None).unwrap(),
        LookupOutcome::PreliminaryRun { .. }
    ));

    let mut direct =
        LookupCoordinator::open(reserving.store().clone(), spec()).unwrap().with_preliminary(false);
    direct.set_default_scenario("sc").unwrap();
    assert!(!direct.preliminary());
    let fresh = params(0.5, 1.0);
    assert_eq!(direct.lookup(&fresh, None).unwrap(), LookupOutcome::Waiting);
    assert!(matches!(direct.run_state(&stale, None), Err(CoordinatorError::NotFound)));
    assert!(matches!(direct.run_state(&fresh, None), Err(CoordinatorError::NotFound)));

    assert!(matches!(direct.lookup(&fresh, None).unwrap(), LookupOutcome::NewRun { .. }));
    assert_eq!(reserving.run_state(&fresh, None).unwrap(), RunState::New);
}

#[test]
fn second_distinct_vector_discards_provisional_run() {
    let coordinator = coordinator();
    let first = params(0.0, 1.0);
    let second = params(0.1, 1.0);
    assert!(matches!(
        coordinator.lookup(&first, None).unwrap(),
        LookupOutcome::PreliminaryRun { .. }
    ));
    assert_eq!(coordinator.lookup(&second, None).unwrap(), LookupOutcome::Waiting);
    assert!(matches!(coordinator.run_state(&first, None), Err(CoordinatorError::NotFound)));
    assert!(matches!(coordinator.run_state(&second, None), Err(CoordinatorError::NotFound)));
}

#[test]
fn alternating_vectors_never_schedule() {
    let coordinator = coordinator();
    let first = params(0.0, 1.0);
    let second = params(0.1, 1.0);
    for _ in 0 .. 3 {
        assert!(matches!(
            coordinator.lookup(&first, None).unwrap(),
            LookupOutcome::PreliminaryRun { .. }
        ));
        assert_eq!(coordinator.lookup(&second, None).unwrap(), LookupOutcome::Waiting);
    }
    assert_eq!(coordinator.claim_next(None).unwrap(), ClaimOutcome::NoPendingWork);
}

#[test]
fn run_ids_are_not_reused_after_deletion() {
    let coordinator = coordinator();
    let LookupOutcome::PreliminaryRun {
        run_id: first,
    } = coordinator.lookup(&params(0.0, 1.0), None).unwrap()
    else {
        panic!("expected preliminary run");
    };
    coordinator.lookup(&params(0.2, 1.0), None).unwrap();
    let LookupOutcome::PreliminaryRun {
        run_id: second,
    } = coordinator.lookup(&params(0.0, 1.0), None).unwrap()
    else {
        panic!("expected preliminary run");
    };
    assert!(second > first);
}

#[test]
fn lookup_within_resolution_hits_same_run() {
    let coordinator = coordinator();
    coordinator.lookup(&params(0.25, 1.0), None).unwrap();
    assert!(matches!(
        coordinator.lookup(&params(0.250_000_2, 1.0), None).unwrap(),
        LookupOutcome::NewRun { .. }
    ));
}

// ============================================================================
// SECTION: Claims and Deposits
// ============================================================================

#[test]
fn claim_activates_lowest_new_run_once() {
    let coordinator = coordinator().with_preliminary(false);
    coordinator.lookup(&params(0.0, 1.0), None).unwrap();
    coordinator.lookup(&params(0.5, 1.0), None).unwrap();
    let ClaimOutcome::Claimed(first) = coordinator.claim_next(None).unwrap() else {
        panic!("expected claim");
    };
    assert_close(&first.parameters, &params(0.0, 1.0));
    assert_eq!(coordinator.run_state(&params(0.0, 1.0), None).unwrap(), RunState::Active);
    let ClaimOutcome::Claimed(second) = coordinator.claim_next(None).unwrap() else {
        panic!("expected claim");
    };
    assert!(second.run_id > first.run_id);
    assert_eq!(coordinator.claim_next(None).unwrap(), ClaimOutcome::NoPendingWork);
}

#[test]
fn deposit_completes_active_run_and_rejects_repeats() {
    let coordinator = coordinator().with_preliminary(false);
    let p = params(0.0, 1.0);
    coordinator.lookup(&p, None).unwrap();
    let err = coordinator.deposit(&p, None, StoredResult::Scalar(1.0), false).unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::WrongState {
            expected: RunState::Active,
            actual: RunState::New,
            ..
        }
    ));
    coordinator.claim_next(None).unwrap();
    let run_id = coordinator.deposit(&p, None, StoredResult::Scalar(42.0), false).unwrap();
    assert_eq!(
        coordinator.lookup(&p, None).unwrap(),
        LookupOutcome::Completed {
            run_id,
            result: StoredResult::Scalar(42.0)
        }
    );
    let err = coordinator.deposit(&p, None, StoredResult::Scalar(7.0), false).unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::WrongState {
            actual: RunState::Completed,
            ..
        }
    ));
    coordinator.deposit(&p, None, StoredResult::Scalar(7.0), true).unwrap();
    assert!(matches!(
        coordinator.lookup(&p, None).unwrap(),
        LookupOutcome::Completed {
            result: StoredResult::Scalar(value),
            ..
        } if value == 7.0
    ));
}

#[test]
fn deposit_for_unknown_vector_is_not_found() {
    let coordinator = coordinator();
    let err = coordinator.deposit(&params(0.0, 0.0), None, StoredResult::Scalar(1.0), true);
    assert!(matches!(err, Err(CoordinatorError::NotFound)));
}

#[test]
fn failed_payload_build_rolls_back() {
    let coordinator = coordinator().with_preliminary(false);
    let p = params(0.0, 1.0);
    coordinator.lookup(&p, None).unwrap();
    coordinator.claim_next(None).unwrap();
    let err = coordinator
        .complete_with(&p, None, false, |_| Err(CoordinatorError::Payload("disk full".to_string())))
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::Payload(_)));
    assert_eq!(coordinator.run_state(&p, None).unwrap(), RunState::Active);
}

#[test]
fn claim_with_state_and_set_state_drive_configuration_states() {
    let coordinator = coordinator().with_preliminary(false);
    let p = params(-0.5, 0.25);
    coordinator.lookup(&p, None).unwrap();
    let ClaimOutcome::Claimed(run) =
        coordinator.claim_with_state(None, RunState::New, RunState::Configuring).unwrap()
    else {
        panic!("expected claim");
    };
    coordinator.set_state(run.run_id, RunState::Configured).unwrap();
    assert_eq!(coordinator.run_state(&p, None).unwrap(), RunState::Configured);
    assert_close(&coordinator.run_parameters(run.run_id).unwrap(), &p);
    assert_eq!(coordinator.claim_next(None).unwrap(), ClaimOutcome::NoPendingWork);
    assert!(matches!(
        coordinator.claim_with_state(None, RunState::Configured, RunState::Active).unwrap(),
        ClaimOutcome::Claimed(_)
    ));
}

#[test]
fn unknown_run_ids_are_reported() {
    let coordinator = coordinator();
    let missing = crate::core::identifiers::RunId::from_raw(99).unwrap();
    assert!(matches!(
        coordinator.set_state(missing, RunState::New),
        Err(CoordinatorError::RunNotFound(id)) if id == missing
    ));
    assert!(matches!(coordinator.run_parameters(missing), Err(CoordinatorError::RunNotFound(_))));
}

// ============================================================================
// SECTION: Scenarios
// ============================================================================

#[test]
fn scenarios_partition_runs() {
    let mut coordinator = coordinator().with_preliminary(false);
    let p = params(0.0, 1.0);
    coordinator.lookup(&p, None).unwrap();
    coordinator.select_scenario("other", true).unwrap();
    assert!(matches!(coordinator.run_state(&p, Some("other")), Err(CoordinatorError::NotFound)));
    assert_eq!(coordinator.claim_next(Some("other")).unwrap(), ClaimOutcome::NoPendingWork);
    assert!(matches!(coordinator.claim_next(None).unwrap(), ClaimOutcome::Claimed(_)));
    coordinator.set_default_scenario("other").unwrap();
    assert_eq!(coordinator.default_scenario(), Some("other"));
    assert_eq!(coordinator.scenarios().unwrap(), vec!["other".to_string(), "sc".to_string()]);
}

#[test]
fn explicit_scenarios_must_exist() {
    let coordinator = coordinator();
    assert!(matches!(
        coordinator.lookup(&params(0.0, 1.0), Some("missing")),
        Err(CoordinatorError::ScenarioNotFound(name)) if name == "missing"
    ));
    let bare = LookupCoordinator::open(InMemoryLookupStore::new(), spec()).unwrap();
    assert!(matches!(bare.claim_next(None), Err(CoordinatorError::NoScenario)));
}

// ============================================================================
// SECTION: Study Reopen
// ============================================================================

#[test]
fn reopen_validates_stored_definitions() {
    let store = InMemoryLookupStore::new();
    LookupCoordinator::open(store.clone(), spec()).unwrap();
    LookupCoordinator::open(store.clone(), spec()).unwrap();

    let changed = ParameterSet::new([
        ("a", Parameter::continuous(-1.0, 1.0).unwrap()),
        ("b", Parameter::continuous_with_resolution(0.0, 2.0, 1e-6).unwrap()),
    ])
    .unwrap();
    let err = LookupCoordinator::open(store.clone(), StudySpec::new("S", changed).unwrap())
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::ConfigMismatch { .. }));

    let extra = ParameterSet::new([
        ("a", Parameter::continuous(-1.0, 1.0).unwrap()),
        ("b", Parameter::continuous_with_resolution(0.0, 2.0, 1e-7).unwrap()),
        ("c", Parameter::continuous(-5.0, 0.0).unwrap()),
    ])
    .unwrap();
    let err =
        LookupCoordinator::open(store, StudySpec::new("S", extra).unwrap()).unwrap_err();
    assert!(matches!(err, CoordinatorError::ConfigMismatch { .. }));
}

#[test]
fn constant_flag_does_not_affect_reopen() {
    let store = InMemoryLookupStore::new();
    LookupCoordinator::open(store.clone(), spec()).unwrap();
    let constant = ParameterSet::new([
        ("a", Parameter::continuous(-1.0, 1.0).unwrap().with_constant(0.0).unwrap()),
        ("b", Parameter::continuous_with_resolution(0.0, 2.0, 1e-7).unwrap()),
    ])
    .unwrap();
    assert!(LookupCoordinator::open(store, StudySpec::new("S", constant).unwrap()).is_ok());
}
