// crates/objfun-core/src/runtime/objective/tests.rs
// ============================================================================
// Module: Objective Function Tests
// Description: Unit tests for the payload-kind adapters.
// Purpose: Validate placeholders, payload files and observation-name checks.
// Dependencies: objfun-core, tempfile
// ============================================================================

//! ## Overview
//! Exercises each payload kind against the in-memory store with payload
//! files written to a temporary directory.

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

use std::collections::BTreeMap;

use super::DEFAULT_RESIDUAL_LEN;
use super::Evaluation;
use super::ObjectiveError;
use super::ObjectiveFunction;
use crate::core::parameter::Parameter;
use crate::core::payload::ObjectiveValue;
use crate::core::payload::PayloadKind;
use crate::core::payload::ResultPayload;
use crate::core::payload::StoredResult;
use crate::core::study::ParameterSet;
use crate::core::study::ParameterValues;
use crate::core::study::StudySpec;
use crate::runtime::coordinator::CoordinatorError;
use crate::runtime::coordinator::LookupCoordinator;
use crate::runtime::store::InMemoryLookupStore;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn spec(observations: &[&str]) -> StudySpec {
    let parameters = ParameterSet::new([
        ("a", Parameter::continuous(-1.0, 1.0).unwrap()),
        ("b", Parameter::integer(0, 10).unwrap()),
        ("c", Parameter::continuous(0.0, 5.0).unwrap().with_constant(2.0).unwrap()),
    ])
    .unwrap();
    StudySpec::new("S", parameters).unwrap().with_observation_names(observations.to_vec()).unwrap()
}

fn objective(
    kind: PayloadKind,
    observations: &[&str],
    basedir: &std::path::Path,
) -> ObjectiveFunction<InMemoryLookupStore> {
    let mut coordinator =
        LookupCoordinator::open(InMemoryLookupStore::new(), spec(observations)).unwrap();
    coordinator.set_default_scenario("sc").unwrap();
    ObjectiveFunction::new(coordinator.with_preliminary(false), kind, basedir).unwrap()
}

fn params(a: f64, b: f64) -> ParameterValues {
    [("a".to_string(), a), ("b".to_string(), b)].into_iter().collect()
}

/// Schedules and claims the run for `p`.
fn schedule_and_claim(objective: &ObjectiveFunction<InMemoryLookupStore>, p: &ParameterValues) {
    assert_eq!(objective.result(p, None).unwrap(), Evaluation::NewRun);
    objective.coordinator().claim_next(None).unwrap();
}

// ============================================================================
// SECTION: Misfit
// ============================================================================

#[test]
fn misfit_returns_placeholder_then_value() {
    let dir = tempfile::tempdir().unwrap();
    let objective = objective(PayloadKind::Misfit, &[], dir.path());
    let p = params(0.5, 3.0);
    schedule_and_claim(&objective, &p);
    let Evaluation::Placeholder(ObjectiveValue::Scalar(placeholder)) =
        objective.result(&p, None).unwrap()
    else {
        panic!("expected scalar placeholder");
    };
    assert!((0.0 .. 1.0).contains(&placeholder));
    objective.deposit(&p, &ResultPayload::Scalar(42.0), None, false).unwrap();
    let evaluation = objective.result(&p, None).unwrap();
    assert_eq!(evaluation, Evaluation::Value(ObjectiveValue::Scalar(42.0)));
    assert!(!evaluation.is_signal());
    let value = evaluation.value().unwrap();
    assert_eq!(value.as_scalar(), Some(42.0));
    assert!(value.as_vector().is_none());
}

#[test]
fn signals_carry_no_value() {
    let dir = tempfile::tempdir().unwrap();
    let objective = objective(PayloadKind::Misfit, &[], dir.path());
    let signal = objective.result(&params(0.25, 1.0), None).unwrap();
    assert_eq!(signal, Evaluation::NewRun);
    assert!(signal.is_signal());
    assert!(signal.value().is_none());
    assert_eq!(signal.label(), "new_run");
}

#[test]
fn evaluate_accepts_active_and_full_vectors() {
    let dir = tempfile::tempdir().unwrap();
    let objective = objective(PayloadKind::Misfit, &[], dir.path());
    assert_eq!(objective.evaluate(&[0.5, 3.0], &[]).unwrap(), Evaluation::NewRun);
    assert!(matches!(
        objective.evaluate(&[0.5, 3.0, 4.0], &[]).unwrap(),
        Evaluation::Placeholder(ObjectiveValue::Scalar(_))
    ));
    assert!(matches!(objective.evaluate(&[0.5], &[]), Err(ObjectiveError::Study(_))));
}

#[test]
fn evaluate_rejects_gradients() {
    let dir = tempfile::tempdir().unwrap();
    let objective = objective(PayloadKind::Misfit, &[], dir.path());
    assert!(matches!(
        objective.evaluate(&[0.5, 3.0], &[0.0, 0.0]),
        Err(ObjectiveError::GradientNotSupported(2))
    ));
}

#[test]
fn deposit_rejects_other_payload_kinds() {
    let dir = tempfile::tempdir().unwrap();
    let objective = objective(PayloadKind::Misfit, &[], dir.path());
    let p = params(0.5, 3.0);
    schedule_and_claim(&objective, &p);
    let err = objective.deposit(&p, &ResultPayload::Residuals(vec![1.0]), None, false).unwrap_err();
    assert!(matches!(
        err,
        ObjectiveError::KindMismatch {
            expected: PayloadKind::Misfit,
            actual: PayloadKind::Residual
        }
    ));
}

#[test]
fn deposit_requires_active_run() {
    let dir = tempfile::tempdir().unwrap();
    let objective = objective(PayloadKind::Misfit, &[], dir.path());
    let p = params(0.5, 3.0);
    assert_eq!(objective.result(&p, None).unwrap(), Evaluation::NewRun);
    let err = objective.deposit(&p, &ResultPayload::Scalar(1.0), None, false).unwrap_err();
    assert!(matches!(err, ObjectiveError::Coordinator(CoordinatorError::WrongState { .. })));
    objective.deposit(&p, &ResultPayload::Scalar(1.0), None, true).unwrap();
}

// ============================================================================
// SECTION: Residuals
// ============================================================================

#[test]
fn residuals_are_written_to_run_files_and_learn_length() {
    let dir = tempfile::tempdir().unwrap();
    let objective = objective(PayloadKind::Residual, &[], dir.path());
    let p = params(-0.25, 1.0);
    schedule_and_claim(&objective, &p);
    assert_eq!(objective.num_residuals(), DEFAULT_RESIDUAL_LEN);
    let Evaluation::Placeholder(ObjectiveValue::Vector(placeholder)) =
        objective.result(&p, None).unwrap()
    else {
        panic!("expected vector placeholder");
    };
    assert_eq!(placeholder.len(), DEFAULT_RESIDUAL_LEN);

    let run_id =
        objective.deposit(&p, &ResultPayload::Residuals(vec![1.0, 2.0, 3.0]), None, false).unwrap();
    let path = dir.path().join(format!("residuals_{run_id}.json"));
    assert!(path.is_file());
    let run = objective.coordinator().run(&p, None).unwrap();
    assert_eq!(run.result, Some(StoredResult::FileRef(path)));

    let evaluation = objective.result(&p, None).unwrap();
    assert_eq!(evaluation, Evaluation::Value(ObjectiveValue::Vector(vec![1.0, 2.0, 3.0])));
    let value = evaluation.value().unwrap();
    assert_eq!(value.as_vector(), Some(&[1.0, 2.0, 3.0][..]));
    assert_eq!(value.as_scalar(), None);
    assert_eq!(objective.num_residuals(), 3);

    let q = params(0.75, 2.0);
    schedule_and_claim(&objective, &q);
    let Evaluation::Placeholder(ObjectiveValue::Vector(placeholder)) =
        objective.result(&q, None).unwrap()
    else {
        panic!("expected vector placeholder");
    };
    assert_eq!(placeholder.len(), 3);

    objective.deposit(&q, &ResultPayload::Residuals(vec![0.5; 5]), None, false).unwrap();
    assert!(matches!(
        objective.result(&q, None).unwrap(),
        Evaluation::Value(ObjectiveValue::Vector(values)) if values.len() == 5
    ));
    assert_eq!(objective.num_residuals(), 3);
}

#[test]
fn unreadable_payload_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let objective = objective(PayloadKind::Residual, &[], dir.path());
    let p = params(0.0, 0.0);
    schedule_and_claim(&objective, &p);
    let run_id = objective.deposit(&p, &ResultPayload::Residuals(vec![1.0]), None, false).unwrap();
    std::fs::write(dir.path().join(format!("residuals_{run_id}.json")), b"not json").unwrap();
    assert!(matches!(objective.result(&p, None), Err(ObjectiveError::PayloadFile { .. })));
}

// ============================================================================
// SECTION: Simulated Observations
// ============================================================================

fn series(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(name, value)| ((*name).to_string(), *value)).collect()
}

#[test]
fn simobs_requires_observation_names() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = LookupCoordinator::open(InMemoryLookupStore::new(), spec(&[])).unwrap();
    let err = ObjectiveFunction::new(coordinator, PayloadKind::SimObs, dir.path()).unwrap_err();
    assert!(matches!(err, ObjectiveError::ObservationMismatch(_)));
}

#[test]
fn simobs_round_trips_named_series_in_sorted_order() {
    let dir = tempfile::tempdir().unwrap();
    let objective = objective(PayloadKind::SimObs, &["temp", "olr", "rain"], dir.path());
    assert_eq!(objective.observation_names(), ["olr", "rain", "temp"]);
    assert_eq!(objective.num_residuals(), 3);
    let p = params(0.1, 5.0);
    schedule_and_claim(&objective, &p);
    let Evaluation::Placeholder(placeholder) = objective.named_series(&p, None).unwrap() else {
        panic!("expected placeholder series");
    };
    assert_eq!(placeholder.len(), 3);

    let run_id = objective
        .deposit(
            &p,
            &ResultPayload::NamedSeries(series(&[("temp", 1.0), ("olr", 2.0), ("rain", 3.0)])),
            None,
            false,
        )
        .unwrap();
    assert!(dir.path().join(format!("simobs_{run_id}.json")).is_file());
    assert_eq!(
        objective.named_series(&p, None).unwrap(),
        Evaluation::Value(series(&[("olr", 2.0), ("rain", 3.0), ("temp", 1.0)]))
    );
    assert_eq!(
        objective.result(&p, None).unwrap(),
        Evaluation::Value(ObjectiveValue::Vector(vec![2.0, 3.0, 1.0]))
    );
}

#[test]
fn simobs_rejects_mismatched_names_on_write_and_read() {
    let dir = tempfile::tempdir().unwrap();
    let objective = objective(PayloadKind::SimObs, &["olr", "temp"], dir.path());
    let p = params(0.1, 5.0);
    schedule_and_claim(&objective, &p);
    let err = objective
        .deposit(&p, &ResultPayload::NamedSeries(series(&[("olr", 1.0)])), None, false)
        .unwrap_err();
    assert!(matches!(err, ObjectiveError::ObservationMismatch(_)));
    let err = objective
        .deposit(
            &p,
            &ResultPayload::NamedSeries(series(&[("olr", 1.0), ("temp", 2.0), ("x", 3.0)])),
            None,
            false,
        )
        .unwrap_err();
    assert!(matches!(err, ObjectiveError::ObservationMismatch(_)));

    let run_id = objective
        .deposit(
            &p,
            &ResultPayload::NamedSeries(series(&[("olr", 1.0), ("temp", 2.0)])),
            None,
            false,
        )
        .unwrap();
    std::fs::write(dir.path().join(format!("simobs_{run_id}.json")), br#"{"olr": 1.0}"#).unwrap();
    assert!(matches!(
        objective.named_series(&p, None),
        Err(ObjectiveError::ObservationMismatch(_))
    ));
}

#[test]
fn named_series_needs_simobs_kind() {
    let dir = tempfile::tempdir().unwrap();
    let objective = objective(PayloadKind::Residual, &[], dir.path());
    assert!(matches!(
        objective.named_series(&params(0.0, 0.0), None),
        Err(ObjectiveError::KindMismatch { .. })
    ));
}
