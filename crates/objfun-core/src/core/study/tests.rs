// crates/objfun-core/src/core/study/tests.rs
// ============================================================================
// Module: Study Definition Tests
// Description: Unit tests for parameter sets and study definitions.
// Purpose: Validate ordering, quantization, vector conversion and mismatch detection.
// Dependencies: objfun-core
// ============================================================================

//! ## Overview
//! Exercises the sorted parameter set: key ordering, constant handling,
//! full and active vector conversions and reopen mismatch descriptions.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::float_cmp,
    reason = "Test-only assertions use unwrap/expect and exact float checks for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use super::ParameterSet;
use super::ParameterValues;
use super::QuantizedKey;
use super::StudyError;
use super::StudySpec;
use crate::core::parameter::Parameter;
use crate::core::parameter::ParameterDefinition;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn mixed_set() -> ParameterSet {
    ParameterSet::new([
        ("zeta", Parameter::continuous_with_resolution(0.0, 1.0, 0.01).unwrap()),
        ("alpha", Parameter::integer(-5, 5).unwrap()),
        ("mid", Parameter::continuous(-1.0, 1.0).unwrap().with_constant(0.5).unwrap()),
    ])
    .unwrap()
}

fn values(pairs: &[(&str, f64)]) -> ParameterValues {
    pairs.iter().map(|(name, value)| ((*name).to_string(), *value)).collect()
}

// ============================================================================
// SECTION: Construction
// ============================================================================

#[test]
fn names_are_sorted() {
    let set = mixed_set();
    assert_eq!(set.names(), ["alpha", "mid", "zeta"]);
    assert_eq!(set.num_active(), 2);
}

#[test]
fn rejects_empty_and_duplicate_sets() {
    let empty: Vec<(String, Parameter)> = Vec::new();
    assert_eq!(ParameterSet::new(empty).unwrap_err(), StudyError::NoParameters);
    let param = Parameter::integer(0, 1).unwrap();
    let err = ParameterSet::new([("a", param), ("a", param)]).unwrap_err();
    assert_eq!(err, StudyError::DuplicateParameter("a".to_string()));
}

#[test]
fn bounds_cover_active_parameters_only() {
    let set = mixed_set();
    assert_eq!(set.lower_bounds(), vec![-5.0, 0.0]);
    assert_eq!(set.upper_bounds(), vec![5.0, 1.0]);
}

// ============================================================================
// SECTION: Quantization
// ============================================================================

#[test]
fn quantize_orders_keys_by_name_and_uses_constants() {
    let set = mixed_set();
    let key = set.quantize(&values(&[("zeta", 0.25), ("alpha", 3.0), ("mid", -0.9)])).unwrap();
    assert_eq!(key, QuantizedKey::new(vec![3, 1_500_000, 25]));
    let without_constant = set.quantize(&values(&[("zeta", 0.25), ("alpha", 3.0)])).unwrap();
    assert_eq!(key, without_constant);
}

#[test]
fn quantize_rejects_unknown_and_missing_names() {
    let set = mixed_set();
    let err = set.quantize(&values(&[("alpha", 1.0), ("zeta", 0.1), ("omega", 1.0)])).unwrap_err();
    assert_eq!(err, StudyError::UnknownParameter("omega".to_string()));
    let err = set.quantize(&values(&[("alpha", 1.0)])).unwrap_err();
    assert_eq!(err, StudyError::MissingParameter("zeta".to_string()));
}

#[test]
fn quantize_reports_the_failing_parameter() {
    let set = mixed_set();
    let err = set.quantize(&values(&[("alpha", 9.0), ("zeta", 0.1)])).unwrap_err();
    assert!(matches!(err, StudyError::Parameter { ref name, .. } if name == "alpha"));
}

#[test]
fn dequantize_restores_grid_values() {
    let set = mixed_set();
    let restored = set.dequantize(&QuantizedKey::new(vec![-2, 1_500_000, 40])).unwrap();
    assert_eq!(restored["alpha"], -2.0);
    assert!((restored["mid"] - 0.5).abs() < 1e-9);
    assert!((restored["zeta"] - 0.4).abs() < 1e-9);
    let err = set.dequantize(&QuantizedKey::new(vec![1])).unwrap_err();
    assert_eq!(
        err,
        StudyError::KeyLength {
            expected: 3,
            actual: 1
        }
    );
}

// ============================================================================
// SECTION: Vector Conversion
// ============================================================================

#[test]
fn values_to_params_accepts_full_and_active_vectors() {
    let set = mixed_set();
    let full = set.values_to_params(&[1.0, 0.2, 0.3]).unwrap();
    assert_eq!(full, values(&[("alpha", 1.0), ("mid", 0.2), ("zeta", 0.3)]));
    let active = set.values_to_params(&[1.0, 0.3]).unwrap();
    assert_eq!(active, values(&[("alpha", 1.0), ("mid", 0.5), ("zeta", 0.3)]));
    let err = set.values_to_params(&[1.0]).unwrap_err();
    assert_eq!(
        err,
        StudyError::WrongLength {
            full: 3,
            active: 2,
            actual: 1
        }
    );
}

#[test]
fn params_to_values_respects_include_constant() {
    let set = mixed_set();
    let params = values(&[("alpha", 1.0), ("zeta", 0.3)]);
    assert_eq!(set.params_to_values(&params, true).unwrap(), vec![1.0, 0.5, 0.3]);
    assert_eq!(set.params_to_values(&params, false).unwrap(), vec![1.0, 0.3]);
    let err = set.params_to_values(&values(&[("alpha", 1.0)]), false).unwrap_err();
    assert_eq!(err, StudyError::MissingParameter("zeta".to_string()));
}

// ============================================================================
// SECTION: Mismatch Detection
// ============================================================================

#[test]
fn identical_definitions_have_no_mismatches() {
    let set = mixed_set();
    assert!(set.definition_mismatches(&set.definitions()).is_empty());
}

#[test]
fn changed_missing_and_extra_parameters_are_reported() {
    let set = mixed_set();
    let mut stored = set.definitions();
    stored[2].1 = ParameterDefinition::Continuous {
        minv: 0.0,
        maxv: 1.0,
        resolution: 0.001,
    };
    let mismatches = set.definition_mismatches(&stored);
    assert_eq!(mismatches.len(), 1);
    assert!(mismatches[0].contains("zeta"));

    stored.pop();
    let mismatches = set.definition_mismatches(&stored);
    assert!(mismatches.iter().any(|line| line.contains("number of parameters")));
    assert!(mismatches.iter().any(|line| line.contains("configured parameter zeta")));

    let mut extra = set.definitions();
    extra.push((
        "omega".to_string(),
        ParameterDefinition::Integer {
            minv: 0,
            maxv: 1,
        },
    ));
    let mismatches = set.definition_mismatches(&extra);
    assert!(mismatches.iter().any(|line| line.contains("stored parameter omega")));
}

#[test]
fn observation_names_are_sorted_and_unique() {
    let spec = StudySpec::new("S", mixed_set()).unwrap().with_observation_names(["b", "a"]).unwrap();
    assert_eq!(spec.observation_names(), ["a", "b"]);
    let err = StudySpec::new("S", mixed_set())
        .unwrap()
        .with_observation_names(["a", "a"])
        .unwrap_err();
    assert_eq!(err, StudyError::DuplicateObservation("a".to_string()));
    assert_eq!(StudySpec::new(" ", mixed_set()).unwrap_err(), StudyError::EmptyName);
}

#[test]
fn observation_mismatch_is_reported() {
    let spec = StudySpec::new("S", mixed_set()).unwrap().with_observation_names(["a", "b"]).unwrap();
    let definitions = spec.parameters().definitions();
    assert!(spec.mismatches(&definitions, &["b".to_string(), "a".to_string()]).is_empty());
    let mismatches = spec.mismatches(&definitions, &["a".to_string()]);
    assert_eq!(mismatches.len(), 1);
    assert!(mismatches[0].contains("observation names"));
}
