// crates/objfun-core/src/core/parameter.rs
// ============================================================================
// Module: Parameter Codec
// Description: Bounded parameter definitions and their integer quantization.
// Purpose: Map real-valued parameters onto exact integer lookup keys.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! A parameter is an immutable range definition. Continuous parameters are
//! quantized onto a grid of `resolution`-sized buckets anchored at `minv`;
//! integer parameters map onto themselves. Lookup keys are the bucket indices,
//! which lets the lookup table use exact integer comparison instead of float
//! equality.
//!
//! Continuous values are accepted within a tolerance band of
//! `0.99 * resolution` outside `[minv, maxv]` so that a value produced by
//! [`ContinuousParameter::inv_transform`] always transforms back. Integer
//! parameters are checked strictly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default resolution of continuous parameters.
pub const DEFAULT_RESOLUTION: f64 = 1e-6;
/// Fraction of the resolution tolerated outside the parameter bounds.
const TOLERANCE_FRACTION: f64 = 0.99;
/// Exclusive upper limit for bucket counts (`2^63`, exactly representable).
const BUCKET_LIMIT: f64 = 9_223_372_036_854_775_808.0;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Parameter definition and conversion errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterError {
    /// Lower bound is not strictly smaller than the upper bound.
    #[error("invalid parameter range: {0}")]
    InvalidRange(String),
    /// Resolution is not positive or too fine for the range.
    #[error("invalid resolution: {0}")]
    InvalidResolution(String),
    /// Value lies outside the accepted bounds.
    #[error("value out of range: {0}")]
    OutOfRange(String),
    /// Value supplied for an integer parameter has a fractional part.
    #[error("value is not an integer: {0}")]
    NotIntegral(String),
}

// ============================================================================
// SECTION: Integer Parameters
// ============================================================================

/// Integer parameter with inclusive bounds and identity quantization.
#[derive(Debug, Clone, Copy)]
pub struct IntegerParameter {
    /// Minimum value (inclusive).
    minv: i64,
    /// Maximum value (inclusive).
    maxv: i64,
    /// Fixed value when the parameter is excluded from optimisation.
    constant: Option<i64>,
}

impl IntegerParameter {
    /// Creates an integer parameter spanning `[minv, maxv]`.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::InvalidRange`] when `minv >= maxv`.
    pub fn new(minv: i64, maxv: i64) -> Result<Self, ParameterError> {
        if minv >= maxv {
            return Err(ParameterError::InvalidRange(format!(
                "minv {minv} must be smaller than maxv {maxv}"
            )));
        }
        Ok(Self {
            minv,
            maxv,
            constant: None,
        })
    }

    /// Marks the parameter constant at `value`.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::OutOfRange`] when `value` is out of bounds.
    pub fn with_constant(mut self, value: i64) -> Result<Self, ParameterError> {
        self.check_value(value)?;
        self.constant = Some(value);
        Ok(self)
    }

    /// Returns the minimum value.
    #[must_use]
    pub const fn minv(&self) -> i64 {
        self.minv
    }

    /// Returns the maximum value.
    #[must_use]
    pub const fn maxv(&self) -> i64 {
        self.maxv
    }

    /// Returns the fixed value of a constant parameter.
    #[must_use]
    pub const fn constant(&self) -> Option<i64> {
        self.constant
    }

    /// Maps a value onto its lookup key (identity).
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::OutOfRange`] outside `[minv, maxv]`.
    pub fn transform(&self, value: i64) -> Result<i64, ParameterError> {
        self.check_value(value)?;
        Ok(value)
    }

    /// Maps a lookup key back onto its value (identity).
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::OutOfRange`] outside `[minv, maxv]`.
    pub fn inv_transform(&self, key: i64) -> Result<i64, ParameterError> {
        self.check_value(key)?;
        Ok(key)
    }

    /// Checks the value against the strict bounds.
    fn check_value(&self, value: i64) -> Result<(), ParameterError> {
        if (self.minv ..= self.maxv).contains(&value) {
            Ok(())
        } else {
            Err(ParameterError::OutOfRange(format!(
                "value {value} outside bounds [{}, {}]",
                self.minv, self.maxv
            )))
        }
    }
}

// ============================================================================
// SECTION: Continuous Parameters
// ============================================================================

/// Continuous parameter quantized at a fixed resolution.
#[derive(Debug, Clone, Copy)]
pub struct ContinuousParameter {
    /// Minimum value (inclusive).
    minv: f64,
    /// Maximum value (inclusive).
    maxv: f64,
    /// Bucket width used for quantization.
    resolution: f64,
    /// Fixed value when the parameter is excluded from optimisation.
    constant: Option<f64>,
}

impl ContinuousParameter {
    /// Creates a continuous parameter with the default resolution.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError`] when the range is invalid.
    pub fn new(minv: f64, maxv: f64) -> Result<Self, ParameterError> {
        Self::with_resolution(minv, maxv, DEFAULT_RESOLUTION)
    }

    /// Creates a continuous parameter with an explicit resolution.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::InvalidRange`] when the bounds are not finite
    /// or misordered and [`ParameterError::InvalidResolution`] when the bucket
    /// count does not fit a signed 64-bit key.
    pub fn with_resolution(minv: f64, maxv: f64, resolution: f64) -> Result<Self, ParameterError> {
        if !minv.is_finite() || !maxv.is_finite() || minv >= maxv {
            return Err(ParameterError::InvalidRange(format!(
                "minv {minv} must be smaller than maxv {maxv}"
            )));
        }
        if !resolution.is_finite() || resolution <= 0.0 {
            return Err(ParameterError::InvalidResolution(format!(
                "resolution {resolution} must be finite and positive"
            )));
        }
        let buckets = ((maxv - minv) / resolution).round();
        if !buckets.is_finite() || buckets >= BUCKET_LIMIT {
            return Err(ParameterError::InvalidResolution(format!(
                "resolution {resolution} is too fine for range [{minv}, {maxv}]"
            )));
        }
        Ok(Self {
            minv,
            maxv,
            resolution,
            constant: None,
        })
    }

    /// Marks the parameter constant at `value`.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::OutOfRange`] when `value` is out of bounds.
    pub fn with_constant(mut self, value: f64) -> Result<Self, ParameterError> {
        self.check_value(value)?;
        self.constant = Some(value);
        Ok(self)
    }

    /// Returns the minimum value.
    #[must_use]
    pub const fn minv(&self) -> f64 {
        self.minv
    }

    /// Returns the maximum value.
    #[must_use]
    pub const fn maxv(&self) -> f64 {
        self.maxv
    }

    /// Returns the quantization resolution.
    #[must_use]
    pub const fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Returns the fixed value of a constant parameter.
    #[must_use]
    pub const fn constant(&self) -> Option<f64> {
        self.constant
    }

    /// Maps a value onto its bucket index.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::OutOfRange`] outside the tolerance band.
    pub fn transform(&self, value: f64) -> Result<i64, ParameterError> {
        self.check_value(value)?;
        let bucket = ((value - self.minv) / self.resolution).round();
        #[allow(
            clippy::cast_possible_truncation,
            reason = "bucket count is bounded below 2^63 at construction; `as` saturates"
        )]
        let key = bucket as i64;
        Ok(key)
    }

    /// Maps a bucket index back onto a value.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::OutOfRange`] when the key decodes outside the
    /// tolerance band.
    pub fn inv_transform(&self, key: i64) -> Result<f64, ParameterError> {
        let value = self.minv + key_to_f64(key) * self.resolution;
        self.check_value(value)?;
        Ok(value)
    }

    /// Checks the value against the bounds widened by the tolerance band.
    fn check_value(&self, value: f64) -> Result<(), ParameterError> {
        let slack = TOLERANCE_FRACTION * self.resolution;
        if (self.minv - slack ..= self.maxv + slack).contains(&value) {
            Ok(())
        } else {
            Err(ParameterError::OutOfRange(format!(
                "value {value} outside bounds [{}, {}]",
                self.minv, self.maxv
            )))
        }
    }
}

// ============================================================================
// SECTION: Parameter
// ============================================================================

/// Concrete parameter kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    /// Integer-valued parameter.
    Integer,
    /// Real-valued parameter with a resolution.
    Continuous,
}

impl ParameterKind {
    /// Returns the stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Continuous => "continuous",
        }
    }
}

/// A named study parameter of either kind.
///
/// # Invariants
/// - Equality compares kind, bounds and resolution; the constant setting is
///   not part of the definition.
#[derive(Debug, Clone, Copy)]
pub enum Parameter {
    /// Integer parameter.
    Integer(IntegerParameter),
    /// Continuous parameter.
    Continuous(ContinuousParameter),
}

impl Parameter {
    /// Creates an integer parameter.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError`] when the range is invalid.
    pub fn integer(minv: i64, maxv: i64) -> Result<Self, ParameterError> {
        IntegerParameter::new(minv, maxv).map(Self::Integer)
    }

    /// Creates an integer parameter from integral floating-point bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::NotIntegral`] when a bound has a fractional
    /// part, or [`ParameterError`] when the range is invalid.
    pub fn integer_from_bounds(minv: f64, maxv: f64) -> Result<Self, ParameterError> {
        Self::integer(integral(minv)?, integral(maxv)?)
    }

    /// Creates a continuous parameter with the default resolution.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError`] when the range is invalid.
    pub fn continuous(minv: f64, maxv: f64) -> Result<Self, ParameterError> {
        ContinuousParameter::new(minv, maxv).map(Self::Continuous)
    }

    /// Creates a continuous parameter with an explicit resolution.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError`] when the range or resolution is invalid.
    pub fn continuous_with_resolution(
        minv: f64,
        maxv: f64,
        resolution: f64,
    ) -> Result<Self, ParameterError> {
        ContinuousParameter::with_resolution(minv, maxv, resolution).map(Self::Continuous)
    }

    /// Marks the parameter constant at `value`.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError`] when `value` is out of range or, for integer
    /// parameters, not integral.
    pub fn with_constant(self, value: f64) -> Result<Self, ParameterError> {
        match self {
            Self::Integer(param) => param.with_constant(integral(value)?).map(Self::Integer),
            Self::Continuous(param) => param.with_constant(value).map(Self::Continuous),
        }
    }

    /// Returns the parameter kind.
    #[must_use]
    pub const fn kind(&self) -> ParameterKind {
        match self {
            Self::Integer(_) => ParameterKind::Integer,
            Self::Continuous(_) => ParameterKind::Continuous,
        }
    }

    /// Returns the minimum value.
    #[must_use]
    pub fn minv(&self) -> f64 {
        match self {
            Self::Integer(param) => key_to_f64(param.minv()),
            Self::Continuous(param) => param.minv(),
        }
    }

    /// Returns the maximum value.
    #[must_use]
    pub fn maxv(&self) -> f64 {
        match self {
            Self::Integer(param) => key_to_f64(param.maxv()),
            Self::Continuous(param) => param.maxv(),
        }
    }

    /// Returns the resolution of continuous parameters.
    #[must_use]
    pub const fn resolution(&self) -> Option<f64> {
        match self {
            Self::Integer(_) => None,
            Self::Continuous(param) => Some(param.resolution()),
        }
    }

    /// Returns true when the parameter is excluded from optimisation.
    #[must_use]
    pub const fn is_constant(&self) -> bool {
        match self {
            Self::Integer(param) => param.constant().is_some(),
            Self::Continuous(param) => param.constant().is_some(),
        }
    }

    /// Returns the fixed value of a constant parameter.
    #[must_use]
    pub fn constant_value(&self) -> Option<f64> {
        match self {
            Self::Integer(param) => param.constant().map(key_to_f64),
            Self::Continuous(param) => param.constant(),
        }
    }

    /// Maps a value onto its lookup key.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::OutOfRange`] for out-of-bounds values and
    /// [`ParameterError::NotIntegral`] for fractional integer values.
    pub fn transform(&self, value: f64) -> Result<i64, ParameterError> {
        match self {
            Self::Integer(param) => param.transform(integral(value)?),
            Self::Continuous(param) => param.transform(value),
        }
    }

    /// Maps a lookup key back onto its value.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::OutOfRange`] when the key decodes out of range.
    pub fn inv_transform(&self, key: i64) -> Result<f64, ParameterError> {
        match self {
            Self::Integer(param) => param.inv_transform(key).map(key_to_f64),
            Self::Continuous(param) => param.inv_transform(key),
        }
    }

    /// Checks `value` and snaps it onto the quantization grid.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError`] when `value` cannot be transformed.
    pub fn quantize(&self, value: f64) -> Result<f64, ParameterError> {
        self.inv_transform(self.transform(value)?)
    }

    /// Returns the persistable definition of the parameter.
    #[must_use]
    pub const fn definition(&self) -> ParameterDefinition {
        match self {
            Self::Integer(param) => ParameterDefinition::Integer {
                minv: param.minv(),
                maxv: param.maxv(),
            },
            Self::Continuous(param) => ParameterDefinition::Continuous {
                minv: param.minv(),
                maxv: param.maxv(),
                resolution: param.resolution(),
            },
        }
    }
}

impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        self.definition() == other.definition()
    }
}

impl From<IntegerParameter> for Parameter {
    fn from(value: IntegerParameter) -> Self {
        Self::Integer(value)
    }
}

impl From<ContinuousParameter> for Parameter {
    fn from(value: ContinuousParameter) -> Self {
        Self::Continuous(value)
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.definition().fmt(f)
    }
}

// ============================================================================
// SECTION: Definitions
// ============================================================================

/// Persisted form of a parameter definition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParameterDefinition {
    /// Integer parameter bounds.
    Integer {
        /// Minimum value (inclusive).
        minv: i64,
        /// Maximum value (inclusive).
        maxv: i64,
    },
    /// Continuous parameter bounds and resolution.
    Continuous {
        /// Minimum value (inclusive).
        minv: f64,
        /// Maximum value (inclusive).
        maxv: f64,
        /// Quantization resolution.
        resolution: f64,
    },
}

impl ParameterDefinition {
    /// Rebuilds a (non-constant) parameter from the definition.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError`] when the stored definition is invalid.
    pub fn to_parameter(&self) -> Result<Parameter, ParameterError> {
        match *self {
            Self::Integer {
                minv,
                maxv,
            } => Parameter::integer(minv, maxv),
            Self::Continuous {
                minv,
                maxv,
                resolution,
            } => Parameter::continuous_with_resolution(minv, maxv, resolution),
        }
    }
}

impl fmt::Display for ParameterDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer {
                minv,
                maxv,
            } => write!(f, "integer[{minv}, {maxv}]"),
            Self::Continuous {
                minv,
                maxv,
                resolution,
            } => write!(f, "continuous[{minv}, {maxv}] resolution={resolution}"),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Converts an integer key to `f64`.
#[allow(clippy::cast_precision_loss, reason = "keys are bounded by the parameter range")]
const fn key_to_f64(key: i64) -> f64 {
    key as f64
}

/// Converts an integral `f64` to `i64`.
fn integral(value: f64) -> Result<i64, ParameterError> {
    if !value.is_finite() || value.fract().abs() > 0.0 {
        return Err(ParameterError::NotIntegral(format!("{value}")));
    }
    if value < -BUCKET_LIMIT || value >= BUCKET_LIMIT {
        return Err(ParameterError::OutOfRange(format!("value {value} does not fit an integer")));
    }
    #[allow(clippy::cast_possible_truncation, reason = "value is integral and within i64 range")]
    let converted = value as i64;
    Ok(converted)
}
