// crates/objfun-config/src/config.rs
// ============================================================================
// Module: Lookup Configuration
// Description: Configuration loading and validation for lookup studies.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: objfun-core, objfun-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! The file names the study, its base directory and database, the payload
//! kind of the objective function and one table per parameter:
//!
//! ```toml
//! [setup]
//! basedir = "/data/study"
//! study = "S"
//! scenario = "sc"
//!
//! [objective]
//! kind = "misfit"
//!
//! [parameters.a]
//! type = "float"
//! min = -1.0
//! max = 1.0
//!
//! [parameters.n]
//! type = "integer"
//! min = 0
//! max = 10
//! constant = true
//! value = 3
//! ```
//!
//! Missing or invalid configuration fails closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;

use objfun_core::DEFAULT_RESOLUTION;
use objfun_core::Parameter;
use objfun_core::ParameterSet;
use objfun_core::PayloadKind;
use objfun_core::StudySpec;
use objfun_store_sqlite::SqliteStoreConfig;
use objfun_store_sqlite::SqliteStoreMode;
use objfun_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "objfun.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "OBJFUN_CONFIG";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of parameters per study.
const MAX_PARAMETERS: usize = 1024;
/// Maximum number of observation names.
const MAX_OBSERVATIONS: usize = 65_536;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Top-level lookup configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LookupConfig {
    /// Study location and identity.
    pub setup: SetupConfig,
    /// `SQLite` tuning.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Objective-function payload settings.
    #[serde(default)]
    pub objective: ObjectiveConfig,
    /// Parameter definitions keyed by name.
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterConfig>,
}

/// Study location and identity.
#[derive(Debug, Clone, Deserialize)]
pub struct SetupConfig {
    /// Directory holding the database and payload files.
    pub basedir: PathBuf,
    /// Study name.
    pub study: String,
    /// Default scenario name.
    #[serde(default)]
    pub scenario: Option<String>,
    /// Database connection string; defaults to a file inside `basedir`.
    #[serde(default)]
    pub db: Option<String>,
    /// Reserve provisional runs before scheduling new ones.
    #[serde(default = "default_preliminary")]
    pub preliminary: bool,
}

/// `SQLite` tuning options.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Objective-function payload settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectiveConfig {
    /// Result payload kind.
    #[serde(default = "default_kind")]
    pub kind: PayloadKind,
    /// Observation names for `simobs` payloads.
    #[serde(default)]
    pub observations: Vec<String>,
}

impl Default for ObjectiveConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            observations: Vec::new(),
        }
    }
}

/// Parameter value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    /// Continuous parameter quantized at a resolution.
    #[default]
    Float,
    /// Integer parameter.
    Integer,
}

/// One `[parameters.<name>]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct ParameterConfig {
    /// Value type.
    #[serde(rename = "type", default)]
    pub kind: ParameterType,
    /// Lower bound.
    pub min: f64,
    /// Upper bound.
    pub max: f64,
    /// Quantization resolution for float parameters.
    #[serde(default)]
    pub resolution: Option<f64>,
    /// Hold the parameter at `value`.
    #[serde(default)]
    pub constant: bool,
    /// Value of a constant parameter.
    #[serde(default)]
    pub value: Option<f64>,
}

impl ParameterConfig {
    /// Builds the core parameter for the table named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the table does not describe a
    /// valid parameter.
    pub fn to_parameter(&self, name: &str) -> Result<Parameter, ConfigError> {
        let invalid = |detail: String| ConfigError::Invalid(format!("parameters.{name}: {detail}"));
        let parameter = match self.kind {
            ParameterType::Float => Parameter::continuous_with_resolution(
                self.min,
                self.max,
                self.resolution.unwrap_or(DEFAULT_RESOLUTION),
            ),
            ParameterType::Integer => {
                if self.resolution.is_some() {
                    return Err(invalid("resolution applies to float parameters only".to_string()));
                }
                Parameter::integer_from_bounds(self.min, self.max)
            }
        }
        .map_err(|err| invalid(err.to_string()))?;
        match (self.constant, self.value) {
            (true, Some(value)) => {
                parameter.with_constant(value).map_err(|err| invalid(err.to_string()))
            }
            (true, None) => Err(invalid("constant parameter requires a value".to_string())),
            (false, Some(_)) => Err(invalid("value is only allowed with constant = true".to_string())),
            (false, None) => Ok(parameter),
        }
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl LookupConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// An explicit `path` wins, then the `OBJFUN_CONFIG` environment variable,
    /// then `objfun.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed or
    /// validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = read_config_bytes(&resolved)?;
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.setup.validate()?;
        self.storage.validate()?;
        self.objective.validate()?;
        if self.parameters.is_empty() {
            return Err(ConfigError::Invalid("at least one parameter is required".to_string()));
        }
        if self.parameters.len() > MAX_PARAMETERS {
            return Err(ConfigError::Invalid("too many parameters".to_string()));
        }
        for (name, parameter) in &self.parameters {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid("parameter names must be non-empty".to_string()));
            }
            parameter.to_parameter(name)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Conversions
    // ------------------------------------------------------------------------

    /// Builds the study definition.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the parameters or observation
    /// names do not form a valid study.
    pub fn study_spec(&self) -> Result<StudySpec, ConfigError> {
        let entries = self
            .parameters
            .iter()
            .map(|(name, parameter)| Ok((name.clone(), parameter.to_parameter(name)?)))
            .collect::<Result<Vec<_>, ConfigError>>()?;
        let parameters =
            ParameterSet::new(entries).map_err(|err| ConfigError::Invalid(err.to_string()))?;
        StudySpec::new(self.setup.study.trim(), parameters)
            .and_then(|spec| spec.with_observation_names(self.objective.observations.clone()))
            .map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// Builds the `SQLite` store configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unsupported connection strings.
    pub fn store_config(&self) -> Result<SqliteStoreConfig, ConfigError> {
        let mut config =
            SqliteStoreConfig::from_connection_string(self.setup.db.as_deref(), &self.setup.basedir)
                .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        config.busy_timeout_ms = self.storage.busy_timeout_ms;
        config.journal_mode = self.storage.journal_mode;
        config.sync_mode = self.storage.sync_mode;
        Ok(config)
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

impl SetupConfig {
    /// Validates the setup section.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.study.trim().is_empty() {
            return Err(ConfigError::Invalid("setup.study must be non-empty".to_string()));
        }
        validate_path_string("setup.basedir", &self.basedir.to_string_lossy())?;
        if let Some(scenario) = &self.scenario
            && scenario.trim().is_empty()
        {
            return Err(ConfigError::Invalid("setup.scenario must be non-empty".to_string()));
        }
        if let Some(db) = &self.db {
            validate_path_string("setup.db", db)?;
            SqliteStoreConfig::from_connection_string(Some(db), &self.basedir)
                .map_err(|err| ConfigError::Invalid(format!("setup.db: {err}")))?;
        }
        Ok(())
    }
}

impl StorageConfig {
    /// Validates the storage section.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.busy_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "storage.busy_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl ObjectiveConfig {
    /// Validates the objective section.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.kind, self.observations.is_empty()) {
            (PayloadKind::SimObs, true) => {
                return Err(ConfigError::Invalid(
                    "objective.observations is required for simobs".to_string(),
                ));
            }
            (PayloadKind::Misfit | PayloadKind::Residual, false) => {
                return Err(ConfigError::Invalid(format!(
                    "objective.observations is only allowed for simobs, not {}",
                    self.kind
                )));
            }
            _ => {}
        }
        if self.observations.len() > MAX_OBSERVATIONS {
            return Err(ConfigError::Invalid("too many observation names".to_string()));
        }
        let mut seen = BTreeSet::new();
        for name in &self.observations {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "observation names must be non-empty".to_string(),
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate observation name: {name}")));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Default for `setup.preliminary`.
const fn default_preliminary() -> bool {
    true
}

/// Default for `storage.busy_timeout_ms`.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Default for `objective.kind`.
const fn default_kind() -> PayloadKind {
    PayloadKind::Misfit
}

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Reads the config file, failing before buffering more than the size limit.
fn read_config_bytes(path: &Path) -> Result<Vec<u8>, ConfigError> {
    let file = File::open(path).map_err(|err| ConfigError::Io(err.to_string()))?;
    let size = file.metadata().map_err(|err| ConfigError::Io(err.to_string()))?.len();
    let limit = u64::try_from(MAX_CONFIG_FILE_SIZE).unwrap_or(u64::MAX);
    if size > limit {
        return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
    }
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|err| ConfigError::Io(err.to_string()))?;
    if bytes.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
    }
    Ok(bytes)
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}
