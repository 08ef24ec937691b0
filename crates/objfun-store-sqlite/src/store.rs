// crates/objfun-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Lookup Store
// Description: Durable LookupStore backed by SQLite WAL.
// Purpose: Persist the lookup table with exclusive write transactions.
// Dependencies: objfun-core, rusqlite, serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! This module implements a durable [`LookupStore`] using `SQLite`. Studies
//! own parameter definitions (stored as JSON), observation names and
//! scenarios; scenarios own runs; runs own one quantized value per parameter.
//! Child rows are removed by `ON DELETE CASCADE`. Run identifiers use
//! `AUTOINCREMENT` and are never reused.
//!
//! Exact-match lookups scan every run of a scenario together with its value
//! rows, ordered by parameter name, and compare full key tuples.
//! Security posture: database contents are untrusted; unknown state labels,
//! malformed definitions and inconsistent rows fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use objfun_core::LookupStore;
use objfun_core::ParameterDefinition;
use objfun_core::QuantizedKey;
use objfun_core::RunId;
use objfun_core::RunRecord;
use objfun_core::RunState;
use objfun_core::ScenarioId;
use objfun_core::StoreError;
use objfun_core::StoreTransaction;
use objfun_core::StoredResult;
use objfun_core::StudyId;
use objfun_core::StudyRecord;
use objfun_core::StudySpec;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Path selecting a private in-memory database.
const MEMORY_PATH: &str = ":memory:";
/// Connection string prefix for `SQLite` databases.
const SQLITE_URL_PREFIX: &str = "sqlite://";
/// Default database file name inside the study base directory.
pub const DEFAULT_DB_FILE: &str = "objective_function.sqlite";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` lookup store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file (`:memory:` for a private database).
    pub path: PathBuf,
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

impl SqliteStoreConfig {
    /// Creates a configuration with default timeouts and modes.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }

    /// Creates a configuration for a private in-memory database.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MEMORY_PATH)
    }

    /// Resolves a database connection string.
    ///
    /// Accepted forms: `sqlite:///abs/path`, `sqlite://rel/path`, `sqlite://`
    /// (in-memory) and bare paths. Without a connection string the database
    /// is `<basedir>/objective_function.sqlite`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] for other URL schemes.
    pub fn from_connection_string(
        db: Option<&str>,
        basedir: &Path,
    ) -> Result<Self, SqliteStoreError> {
        let Some(db) = db else {
            return Ok(Self::new(basedir.join(DEFAULT_DB_FILE)));
        };
        if let Some(rest) = db.strip_prefix(SQLITE_URL_PREFIX) {
            if rest.is_empty() || rest == MEMORY_PATH {
                return Ok(Self::in_memory());
            }
            return Ok(Self::new(rest));
        }
        if db.contains("://") {
            return Err(SqliteStoreError::Invalid(format!("unsupported database url: {db}")));
        }
        Ok(Self::new(db))
    }

    /// Returns true for a private in-memory database.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY_PATH
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store rows are inconsistent.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data or request.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Db(error.to_string())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed lookup store with WAL support.
///
/// Clones share one connection; open a second store on the same path for an
/// independent connection.
#[derive(Clone)]
pub struct SqliteLookupStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteLookupStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLookupStore").field("config", &self.config).finish_non_exhaustive()
    }
}

impl SqliteLookupStore {
    /// Opens an `SQLite`-backed lookup store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized, or its schema version is unsupported.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        if !config.is_in_memory() {
            validate_store_path(&config.path)?;
            ensure_parent_dir(&config.path)?;
        }
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        debug!(path = %config.path.display(), "opened sqlite lookup store");
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Runs `f` inside an immediate transaction and commits on success.
    fn with_transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        drop(guard);
        Ok(value)
    }
}

impl LookupStore for SqliteLookupStore {
    fn open_study(&self, spec: &StudySpec) -> Result<StudyRecord, StoreError> {
        self.with_transaction(|tx| {
            let existing: Option<i64> = tx
                .query_row("SELECT id FROM studies WHERE name = ?1", params![spec.name()], |row| {
                    row.get(0)
                })
                .optional()?;
            if let Some(raw) = existing {
                return Ok(StudyRecord {
                    study_id: study_id(raw)?,
                    definitions: load_definitions(tx, raw)?,
                    observation_names: load_observation_names(tx, raw)?,
                    created: false,
                });
            }
            tx.execute("INSERT INTO studies (name) VALUES (?1)", params![spec.name()])?;
            let raw = tx.last_insert_rowid();
            let definitions = spec.parameters().definitions();
            for (name, definition) in &definitions {
                let json = serde_json::to_string(definition)
                    .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
                tx.execute(
                    "INSERT INTO parameters (study_id, name, definition) VALUES (?1, ?2, ?3)",
                    params![raw, name, json],
                )?;
            }
            for name in spec.observation_names() {
                tx.execute(
                    "INSERT INTO observation_names (study_id, name) VALUES (?1, ?2)",
                    params![raw, name],
                )?;
            }
            Ok(StudyRecord {
                study_id: study_id(raw)?,
                definitions,
                observation_names: spec.observation_names().to_vec(),
                created: true,
            })
        })
        .map_err(StoreError::from)
    }

    fn scenario(
        &self,
        study: StudyId,
        name: &str,
        create: bool,
    ) -> Result<Option<ScenarioId>, StoreError> {
        self.with_transaction(|tx| {
            let study_raw = sql_id(study.get())?;
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM scenarios WHERE study_id = ?1 AND name = ?2",
                    params![study_raw, name],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(raw) = existing {
                return scenario_id(raw).map(Some);
            }
            if !create {
                return Ok(None);
            }
            tx.execute(
                "INSERT INTO scenarios (study_id, name) VALUES (?1, ?2)",
                params![study_raw, name],
            )?;
            scenario_id(tx.last_insert_rowid()).map(Some)
        })
        .map_err(StoreError::from)
    }

    fn scenarios(&self, study: StudyId) -> Result<Vec<String>, StoreError> {
        self.with_transaction(|tx| {
            let mut statement =
                tx.prepare("SELECT name FROM scenarios WHERE study_id = ?1 ORDER BY name")?;
            let names = statement
                .query_map(params![sql_id(study.get())?], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(names)
        })
        .map_err(StoreError::from)
    }

    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T, E>,
    {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| StoreError::from(SqliteStoreError::Db("mutex poisoned".to_string())))?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| StoreError::from(SqliteStoreError::from(err)))?;
        let mut handle = SqliteTransaction {
            tx,
        };
        let value = f(&mut handle)?;
        handle.tx.commit().map_err(|err| StoreError::from(SqliteStoreError::from(err)))?;
        Ok(value)
    }
}

// ============================================================================
// SECTION: Transactions
// ============================================================================

/// Open immediate transaction; rolled back on drop unless committed.
struct SqliteTransaction<'c> {
    /// Underlying `SQLite` transaction.
    tx: Transaction<'c>,
}

impl SqliteTransaction<'_> {
    /// Loads a run with its keys in parameter-name order.
    fn load_run(&self, raw: i64) -> Result<Option<RunRecord>, SqliteStoreError> {
        let row: Option<(i64, String, Option<f64>, Option<String>)> = self
            .tx
            .query_row(
                "SELECT scenario_id, state, misfit, path FROM runs WHERE id = ?1",
                params![raw],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        let Some((scenario_raw, state, misfit, path)) = row else {
            return Ok(None);
        };
        let mut statement = self.tx.prepare(
            "SELECT rp.value FROM run_parameters rp JOIN parameters p ON p.id = rp.parameter_id \
             WHERE rp.run_id = ?1 ORDER BY p.name",
        )?;
        let keys = statement
            .query_map(params![raw], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(Some(RunRecord {
            run_id: run_id(raw)?,
            scenario_id: scenario_id(scenario_raw)?,
            state: parse_state(&state)?,
            key: QuantizedKey::new(keys),
            result: decode_result(raw, misfit, path)?,
        }))
    }

    /// Returns the parameter row ids of a scenario's study in name order.
    fn parameter_ids(&self, scenario_raw: i64) -> Result<Vec<i64>, SqliteStoreError> {
        let mut statement = self.tx.prepare(
            "SELECT p.id FROM parameters p JOIN scenarios s ON s.study_id = p.study_id WHERE s.id \
             = ?1 ORDER BY p.name",
        )?;
        let ids = statement
            .query_map(params![scenario_raw], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// Finds the id of the run whose keys equal `key`.
    fn find_run_id(
        &self,
        scenario_raw: i64,
        key: &QuantizedKey,
    ) -> Result<Option<i64>, SqliteStoreError> {
        let mut statement = self.tx.prepare(
            "SELECT r.id, rp.value FROM runs r JOIN run_parameters rp ON rp.run_id = r.id JOIN \
             parameters p ON p.id = rp.parameter_id WHERE r.scenario_id = ?1 ORDER BY r.id, p.name",
        )?;
        let mut rows = statement.query(params![scenario_raw])?;
        let mut current: Option<i64> = None;
        let mut values: Vec<i64> = Vec::with_capacity(key.len());
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let value: i64 = row.get(1)?;
            if current != Some(id) {
                if let Some(previous) = current
                    && values.as_slice() == key.as_slice()
                {
                    return Ok(Some(previous));
                }
                current = Some(id);
                values.clear();
            }
            values.push(value);
        }
        Ok(current.filter(|_| values.as_slice() == key.as_slice()))
    }

    /// Updates one run row and checks that it exists.
    fn update_run(
        &self,
        sql: &str,
        run: RunId,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<(), SqliteStoreError> {
        let changed = self.tx.execute(sql, params)?;
        if changed == 1 {
            Ok(())
        } else {
            Err(SqliteStoreError::Invalid(format!("unknown run {run}")))
        }
    }
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn find_run(
        &mut self,
        scenario: ScenarioId,
        key: &QuantizedKey,
    ) -> Result<Option<RunRecord>, StoreError> {
        let scenario_raw = sql_id(scenario.get())?;
        match self.find_run_id(scenario_raw, key)? {
            Some(raw) => Ok(self.load_run(raw)?),
            None => Ok(None),
        }
    }

    fn first_run_in_state(
        &mut self,
        scenario: ScenarioId,
        state: RunState,
    ) -> Result<Option<RunRecord>, StoreError> {
        let raw: Option<i64> = self
            .tx
            .query_row(
                "SELECT id FROM runs WHERE scenario_id = ?1 AND state = ?2 ORDER BY id LIMIT 1",
                params![sql_id(scenario.get())?, state.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(SqliteStoreError::from)?;
        match raw {
            Some(raw) => Ok(self.load_run(raw)?),
            None => Ok(None),
        }
    }

    fn run(&mut self, run: RunId) -> Result<Option<RunRecord>, StoreError> {
        Ok(self.load_run(sql_id(run.get())?)?)
    }

    fn insert_run(
        &mut self,
        scenario: ScenarioId,
        key: &QuantizedKey,
        state: RunState,
    ) -> Result<RunId, StoreError> {
        let scenario_raw = sql_id(scenario.get())?;
        let parameter_ids = self.parameter_ids(scenario_raw)?;
        if parameter_ids.len() != key.len() {
            return Err(SqliteStoreError::Invalid(format!(
                "scenario {scenario} has {} parameters, key has {}",
                parameter_ids.len(),
                key.len()
            ))
            .into());
        }
        self.tx
            .execute(
                "INSERT INTO runs (scenario_id, state) VALUES (?1, ?2)",
                params![scenario_raw, state.as_str()],
            )
            .map_err(SqliteStoreError::from)?;
        let raw = self.tx.last_insert_rowid();
        for (parameter_id, value) in parameter_ids.iter().zip(key.as_slice()) {
            self.tx
                .execute(
                    "INSERT INTO run_parameters (run_id, parameter_id, value) VALUES (?1, ?2, ?3)",
                    params![raw, parameter_id, value],
                )
                .map_err(SqliteStoreError::from)?;
        }
        Ok(run_id(raw)?)
    }

    fn delete_run(&mut self, run: RunId) -> Result<(), StoreError> {
        self.tx
            .execute("DELETE FROM runs WHERE id = ?1", params![sql_id(run.get())?])
            .map_err(SqliteStoreError::from)?;
        Ok(())
    }

    fn set_state(&mut self, run: RunId, state: RunState) -> Result<(), StoreError> {
        let raw = sql_id(run.get())?;
        Ok(self.update_run("UPDATE runs SET state = ?1 WHERE id = ?2", run, params![
            state.as_str(),
            raw
        ])?)
    }

    fn set_result(&mut self, run: RunId, result: &StoredResult) -> Result<(), StoreError> {
        let raw = sql_id(run.get())?;
        match result {
            StoredResult::Scalar(value) => Ok(self.update_run(
                "UPDATE runs SET misfit = ?1, path = NULL WHERE id = ?2",
                run,
                params![value, raw],
            )?),
            StoredResult::FileRef(path) => {
                let path = path.to_str().ok_or_else(|| {
                    SqliteStoreError::Invalid(format!(
                        "payload path is not valid UTF-8: {}",
                        path.display()
                    ))
                })?;
                Ok(self.update_run(
                    "UPDATE runs SET misfit = NULL, path = ?1 WHERE id = ?2",
                    run,
                    params![path, raw],
                )?)
            }
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability and concurrency.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS studies (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE
                );
                CREATE TABLE IF NOT EXISTS parameters (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    study_id INTEGER NOT NULL REFERENCES studies(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    definition TEXT NOT NULL,
                    UNIQUE (study_id, name)
                );
                CREATE TABLE IF NOT EXISTS observation_names (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    study_id INTEGER NOT NULL REFERENCES studies(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    UNIQUE (study_id, name)
                );
                CREATE TABLE IF NOT EXISTS scenarios (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    study_id INTEGER NOT NULL REFERENCES studies(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    UNIQUE (study_id, name)
                );
                CREATE TABLE IF NOT EXISTS runs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    scenario_id INTEGER NOT NULL REFERENCES scenarios(id) ON DELETE CASCADE,
                    state TEXT NOT NULL,
                    misfit REAL,
                    path TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_runs_scenario_state
                    ON runs (scenario_id, state, id);
                CREATE TABLE IF NOT EXISTS run_parameters (
                    run_id INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
                    parameter_id INTEGER NOT NULL REFERENCES parameters(id) ON DELETE CASCADE,
                    value INTEGER NOT NULL,
                    PRIMARY KEY (run_id, parameter_id)
                );",
            )?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit()?;
    Ok(())
}

/// Loads the parameter definitions of a study in name order.
fn load_definitions(
    tx: &Transaction<'_>,
    study_raw: i64,
) -> Result<Vec<(String, ParameterDefinition)>, SqliteStoreError> {
    let mut statement =
        tx.prepare("SELECT name, definition FROM parameters WHERE study_id = ?1 ORDER BY name")?;
    let rows = statement
        .query_map(params![study_raw], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(name, json)| {
            let definition: ParameterDefinition = serde_json::from_str(&json).map_err(|err| {
                SqliteStoreError::Invalid(format!("parameter {name} definition: {err}"))
            })?;
            definition.to_parameter().map_err(|err| {
                SqliteStoreError::Invalid(format!("parameter {name} definition: {err}"))
            })?;
            Ok((name, definition))
        })
        .collect()
}

/// Loads the observation names of a study in name order.
fn load_observation_names(
    tx: &Transaction<'_>,
    study_raw: i64,
) -> Result<Vec<String>, SqliteStoreError> {
    let mut statement =
        tx.prepare("SELECT name FROM observation_names WHERE study_id = ?1 ORDER BY name")?;
    let names = statement
        .query_map(params![study_raw], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}

/// Parses a stored run state label.
fn parse_state(label: &str) -> Result<RunState, SqliteStoreError> {
    RunState::from_str(label).map_err(|err| SqliteStoreError::Corrupt(err.to_string()))
}

/// Decodes the result columns of a run.
fn decode_result(
    raw: i64,
    misfit: Option<f64>,
    path: Option<String>,
) -> Result<Option<StoredResult>, SqliteStoreError> {
    match (misfit, path) {
        (None, None) => Ok(None),
        (Some(value), None) => Ok(Some(StoredResult::Scalar(value))),
        (None, Some(path)) => Ok(Some(StoredResult::FileRef(PathBuf::from(path)))),
        (Some(_), Some(_)) => {
            Err(SqliteStoreError::Corrupt(format!("run {raw} holds both a misfit and a path")))
        }
    }
}

/// Converts an identifier into an `SQLite` integer.
fn sql_id(raw: u64) -> Result<i64, SqliteStoreError> {
    i64::try_from(raw).map_err(|_| SqliteStoreError::Invalid(format!("identifier {raw} too large")))
}

/// Converts an `SQLite` integer into a raw identifier.
fn raw_id(raw: i64) -> Result<u64, SqliteStoreError> {
    u64::try_from(raw).map_err(|_| SqliteStoreError::Corrupt(format!("negative identifier {raw}")))
}

/// Converts a stored study id.
fn study_id(raw: i64) -> Result<StudyId, SqliteStoreError> {
    StudyId::from_raw(raw_id(raw)?)
        .ok_or_else(|| SqliteStoreError::Corrupt("zero study id".to_string()))
}

/// Converts a stored scenario id.
fn scenario_id(raw: i64) -> Result<ScenarioId, SqliteStoreError> {
    ScenarioId::from_raw(raw_id(raw)?)
        .ok_or_else(|| SqliteStoreError::Corrupt("zero scenario id".to_string()))
}

/// Converts a stored run id.
fn run_id(raw: i64) -> Result<RunId, SqliteStoreError> {
    RunId::from_raw(raw_id(raw)?).ok_or_else(|| SqliteStoreError::Corrupt("zero run id".to_string()))
}
