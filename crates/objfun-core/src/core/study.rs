// crates/objfun-core/src/core/study.rs
// ============================================================================
// Module: Study Definition
// Description: Named parameter sets, quantized keys and vector conversions.
// Purpose: Fix the ordered parameter set of a study and map values onto keys.
// Dependencies: crate::core::parameter, serde, thiserror
// ============================================================================

//! ## Overview
//! A [`ParameterSet`] is the stable, sorted-by-name list of parameters fixed
//! when a study is opened. Internally parameters are addressed by position;
//! at the API boundary values are exchanged as name to value maps
//! ([`ParameterValues`]) or as plain vectors in sorted-name order.
//!
//! Constant parameters always quantize to their constant value regardless of
//! what the caller supplies, and are excluded from active vectors and bounds.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::parameter::Parameter;
use crate::core::parameter::ParameterDefinition;
use crate::core::parameter::ParameterError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Parameter values keyed by parameter name.
pub type ParameterValues = BTreeMap<String, f64>;

/// Quantized keys of every study parameter, in sorted-name order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuantizedKey(Vec<i64>);

impl QuantizedKey {
    /// Wraps raw keys (sorted-name order).
    #[must_use]
    pub const fn new(keys: Vec<i64>) -> Self {
        Self(keys)
    }

    /// Returns the keys as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[i64] {
        &self.0
    }

    /// Returns the number of keys.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when no keys are present.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Study definition and conversion errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StudyError {
    /// Study name is empty.
    #[error("study name must be non-empty")]
    EmptyName,
    /// No parameters were supplied.
    #[error("a study needs at least one parameter")]
    NoParameters,
    /// A parameter name was empty.
    #[error("parameter names must be non-empty")]
    EmptyParameterName,
    /// A parameter name was supplied twice.
    #[error("duplicate parameter name: {0}")]
    DuplicateParameter(String),
    /// An observation name was supplied twice.
    #[error("duplicate observation name: {0}")]
    DuplicateObservation(String),
    /// A value for an active parameter is missing.
    #[error("missing value for parameter {0}")]
    MissingParameter(String),
    /// A value names a parameter the study does not define.
    #[error("unknown parameter {0}")]
    UnknownParameter(String),
    /// A vector has neither the full nor the active length.
    #[error(
        "expected {full} values (all parameters) or {active} values (active parameters), got \
         {actual}"
    )]
    WrongLength {
        /// Number of study parameters.
        full: usize,
        /// Number of non-constant parameters.
        active: usize,
        /// Supplied vector length.
        actual: usize,
    },
    /// A quantized key has the wrong number of entries.
    #[error("expected {expected} quantized keys, got {actual}")]
    KeyLength {
        /// Number of study parameters.
        expected: usize,
        /// Supplied key count.
        actual: usize,
    },
    /// A parameter rejected its value or key.
    #[error("parameter {name}: {source}")]
    Parameter {
        /// Parameter name.
        name: String,
        /// Underlying codec error.
        #[source]
        source: ParameterError,
    },
}

// ============================================================================
// SECTION: Parameter Set
// ============================================================================

/// Sorted, non-empty set of named parameters.
///
/// # Invariants
/// - Names are unique, non-empty and sorted.
/// - `names` and `parameters` have equal length and matching positions.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    /// Parameter names in sorted order.
    names: Vec<String>,
    /// Parameters at the same positions as `names`.
    parameters: Vec<Parameter>,
}

impl ParameterSet {
    /// Builds a parameter set from named parameters in any order.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError`] for empty input, empty names or duplicates.
    pub fn new<I, N>(entries: I) -> Result<Self, StudyError>
    where
        I: IntoIterator<Item = (N, Parameter)>,
        N: Into<String>,
    {
        let mut sorted = BTreeMap::new();
        for (name, parameter) in entries {
            let name = name.into();
            if name.is_empty() {
                return Err(StudyError::EmptyParameterName);
            }
            if sorted.contains_key(&name) {
                return Err(StudyError::DuplicateParameter(name));
            }
            sorted.insert(name, parameter);
        }
        if sorted.is_empty() {
            return Err(StudyError::NoParameters);
        }
        let (names, parameters) = sorted.into_iter().unzip();
        Ok(Self {
            names,
            parameters,
        })
    }

    /// Returns the number of parameters.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true when the set is empty (never, once constructed).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns the parameter names in sorted order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Returns the parameter with the given name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.names
            .binary_search_by(|candidate| candidate.as_str().cmp(name))
            .ok()
            .map(|index| &self.parameters[index])
    }

    /// Iterates over `(name, parameter)` pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Parameter)> {
        self.names.iter().map(String::as_str).zip(self.parameters.iter())
    }

    /// Iterates over the non-constant parameters in sorted order.
    pub fn active(&self) -> impl Iterator<Item = (&str, &Parameter)> {
        self.iter().filter(|(_, parameter)| !parameter.is_constant())
    }

    /// Returns the number of non-constant parameters.
    #[must_use]
    pub fn num_active(&self) -> usize {
        self.active().count()
    }

    /// Returns the lower bounds of the active parameters.
    #[must_use]
    pub fn lower_bounds(&self) -> Vec<f64> {
        self.active().map(|(_, parameter)| parameter.minv()).collect()
    }

    /// Returns the upper bounds of the active parameters.
    #[must_use]
    pub fn upper_bounds(&self) -> Vec<f64> {
        self.active().map(|(_, parameter)| parameter.maxv()).collect()
    }

    /// Returns the persistable definitions in sorted order.
    #[must_use]
    pub fn definitions(&self) -> Vec<(String, ParameterDefinition)> {
        self.iter().map(|(name, parameter)| (name.to_string(), parameter.definition())).collect()
    }

    /// Quantizes a value mapping into a lookup key.
    ///
    /// Constant parameters use their constant value; values supplied for
    /// them are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError`] for unknown names, missing active values or
    /// values the codec rejects.
    pub fn quantize(&self, values: &ParameterValues) -> Result<QuantizedKey, StudyError> {
        if let Some(unknown) = values.keys().find(|name| self.get(name).is_none()) {
            return Err(StudyError::UnknownParameter(unknown.clone()));
        }
        let mut keys = Vec::with_capacity(self.len());
        for (name, parameter) in self.iter() {
            let value = match parameter.constant_value() {
                Some(constant) => constant,
                None => *values
                    .get(name)
                    .ok_or_else(|| StudyError::MissingParameter(name.to_string()))?,
            };
            keys.push(parameter.transform(value).map_err(|source| StudyError::Parameter {
                name: name.to_string(),
                source,
            })?);
        }
        Ok(QuantizedKey(keys))
    }

    /// Decodes a lookup key into a value mapping.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError`] when the key length is wrong or a key decodes
    /// out of range.
    pub fn dequantize(&self, key: &QuantizedKey) -> Result<ParameterValues, StudyError> {
        if key.len() != self.len() {
            return Err(StudyError::KeyLength {
                expected: self.len(),
                actual: key.len(),
            });
        }
        self.iter()
            .zip(key.as_slice())
            .map(|((name, parameter), raw)| {
                parameter.inv_transform(*raw).map(|value| (name.to_string(), value)).map_err(
                    |source| StudyError::Parameter {
                        name: name.to_string(),
                        source,
                    },
                )
            })
            .collect()
    }

    /// Converts a vector into a value mapping.
    ///
    /// Accepts either one value per parameter or one value per active
    /// parameter; in the latter case constants are filled in.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError::WrongLength`] for any other length.
    pub fn values_to_params(&self, values: &[f64]) -> Result<ParameterValues, StudyError> {
        let active = self.num_active();
        if values.len() == self.len() {
            return Ok(self.names.iter().cloned().zip(values.iter().copied()).collect());
        }
        if values.len() == active {
            let mut supplied = values.iter().copied();
            let mut mapped = ParameterValues::new();
            for (name, parameter) in self.iter() {
                let value = match parameter.constant_value() {
                    Some(constant) => Some(constant),
                    None => supplied.next(),
                };
                if let Some(value) = value {
                    mapped.insert(name.to_string(), value);
                }
            }
            return Ok(mapped);
        }
        Err(StudyError::WrongLength {
            full: self.len(),
            active,
            actual: values.len(),
        })
    }

    /// Converts a value mapping into a vector in sorted-name order.
    ///
    /// Constant parameters contribute their constant value when
    /// `include_constant` is set and are skipped otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError::MissingParameter`] when an active value is absent.
    pub fn params_to_values(
        &self,
        values: &ParameterValues,
        include_constant: bool,
    ) -> Result<Vec<f64>, StudyError> {
        let mut vector = Vec::with_capacity(self.len());
        for (name, parameter) in self.iter() {
            match parameter.constant_value() {
                Some(constant) => {
                    if include_constant {
                        vector.push(constant);
                    }
                }
                None => vector.push(
                    *values
                        .get(name)
                        .ok_or_else(|| StudyError::MissingParameter(name.to_string()))?,
                ),
            }
        }
        Ok(vector)
    }

    /// Describes every difference between this set and stored definitions.
    #[must_use]
    pub fn definition_mismatches(&self, stored: &[(String, ParameterDefinition)]) -> Vec<String> {
        let mut mismatches = Vec::new();
        if stored.len() != self.len() {
            mismatches.push(format!(
                "number of parameters differs: stored {}, configured {}",
                stored.len(),
                self.len()
            ));
        }
        for (name, definition) in stored {
            match self.get(name) {
                None => mismatches.push(format!("stored parameter {name} is not configured")),
                Some(parameter) if parameter.definition() != *definition => {
                    mismatches.push(format!(
                        "parameter {name} differs: stored {definition}, configured {}",
                        parameter.definition()
                    ));
                }
                Some(_) => {}
            }
        }
        let stored_names: BTreeSet<&str> = stored.iter().map(|(name, _)| name.as_str()).collect();
        for name in &self.names {
            if !stored_names.contains(name.as_str()) {
                mismatches.push(format!("configured parameter {name} is not stored"));
            }
        }
        mismatches
    }
}

// ============================================================================
// SECTION: Study Spec
// ============================================================================

/// Definition of a study: name, parameters and observation names.
///
/// # Invariants
/// - Observation names are unique and sorted.
#[derive(Debug, Clone, PartialEq)]
pub struct StudySpec {
    /// Study name.
    name: String,
    /// Parameter set.
    parameters: ParameterSet,
    /// Observation names for named-series payloads.
    observation_names: Vec<String>,
}

impl StudySpec {
    /// Creates a study definition without observation names.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError::EmptyName`] when `name` is empty.
    pub fn new(name: impl Into<String>, parameters: ParameterSet) -> Result<Self, StudyError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(StudyError::EmptyName);
        }
        Ok(Self {
            name,
            parameters,
            observation_names: Vec::new(),
        })
    }

    /// Sets the observation names used by named-series payloads.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError::DuplicateObservation`] for repeated names.
    pub fn with_observation_names<I, N>(mut self, names: I) -> Result<Self, StudyError>
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        let mut sorted = BTreeSet::new();
        for name in names {
            let name = name.into();
            if !sorted.insert(name.clone()) {
                return Err(StudyError::DuplicateObservation(name));
            }
        }
        self.observation_names = sorted.into_iter().collect();
        Ok(self)
    }

    /// Returns the study name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parameter set.
    #[must_use]
    pub const fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    /// Returns the sorted observation names.
    #[must_use]
    pub fn observation_names(&self) -> &[String] {
        &self.observation_names
    }

    /// Describes every difference between this definition and a stored study.
    #[must_use]
    pub fn mismatches(
        &self,
        definitions: &[(String, ParameterDefinition)],
        observation_names: &[String],
    ) -> Vec<String> {
        let mut mismatches = self.parameters.definition_mismatches(definitions);
        let mut stored_observations = observation_names.to_vec();
        stored_observations.sort();
        if stored_observations != self.observation_names {
            mismatches.push(format!(
                "observation names differ: stored [{}], configured [{}]",
                stored_observations.join(", "),
                self.observation_names.join(", ")
            ));
        }
        mismatches
    }
}

#[cfg(test)]
mod tests;
