// crates/objfun-cli/src/main.rs
// ============================================================================
// Module: Objective Function CLI Entry Point
// Description: Command dispatcher for lookup-table workers and inspection.
// Purpose: Let shell-driven workers claim runs and deposit results.
// Dependencies: clap, objfun-config, objfun-core, objfun-store-sqlite, serde_json
// ============================================================================

//! ## Overview
//! The `objfun` binary opens the study named by the configuration file and
//! exposes the worker side of the lookup protocol: claim the next pending
//! run, deposit its result and inspect or override run states. Every command
//! prints one JSON document on stdout. Protocol signals map to dedicated exit
//! codes so shell drivers can branch without parsing output; errors exit 1
//! with a message on stderr.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use objfun_config::LookupConfig;
use objfun_core::ClaimOutcome;
use objfun_core::CoordinatorError;
use objfun_core::Evaluation;
use objfun_core::LookupCoordinator;
use objfun_core::ObjectiveError;
use objfun_core::ObjectiveFunction;
use objfun_core::ObjectiveValue;
use objfun_core::ParameterValues;
use objfun_core::PayloadKind;
use objfun_core::ResultPayload;
use objfun_core::RunId;
use objfun_core::RunState;
use objfun_store_sqlite::SqliteLookupStore;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a `--params` JSON argument.
const MAX_PARAMS_BYTES: usize = 64 * 1024;
/// Maximum size of a `--result` payload file.
const MAX_RESULT_BYTES: usize = 64 * 1024 * 1024;
/// Environment variable holding the log filter.
const LOG_ENV: &str = "OBJFUN_LOG";
/// Default log filter.
const DEFAULT_LOG_FILTER: &str = "info";

// ============================================================================
// SECTION: Exit Codes
// ============================================================================

/// A provisional run was reserved.
const EXIT_PRELIMINARY_RUN: u8 = 10;
/// A new run was scheduled.
const EXIT_NEW_RUN: u8 = 11;
/// A provisional run was discarded; the caller should wait.
const EXIT_WAITING: u8 = 12;
/// No run is pending in the requested state.
const EXIT_NO_PENDING_WORK: u8 = 13;
/// No run matches the request.
const EXIT_NOT_FOUND: u8 = 14;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "objfun", version, disable_help_subcommand = true)]
struct Cli {
    /// Configuration file (defaults to `OBJFUN_CONFIG`, then `objfun.toml`).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Command to run.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Create or validate the database, study and default scenario.
    Init,
    /// Look up a parameter set, scheduling a run on a miss.
    Lookup(LookupCommand),
    /// Claim the next pending run.
    Claim(ClaimCommand),
    /// Deposit the result of a claimed run.
    Deposit(DepositCommand),
    /// Show the state of the run for a parameter set.
    State(StateCommand),
    /// Set the state of a run by id.
    SetState(SetStateCommand),
    /// List the scenarios of the study.
    Scenarios,
    /// Print the bounds of the active parameters.
    Bounds,
}

/// Arguments for `lookup`.
#[derive(Args, Debug)]
struct LookupCommand {
    /// Parameter values as a JSON object.
    #[arg(long, value_name = "JSON")]
    params: String,
    /// Scenario name (defaults to the configured scenario).
    #[arg(long)]
    scenario: Option<String>,
}

/// Arguments for `claim`.
#[derive(Args, Debug)]
struct ClaimCommand {
    /// Scenario name (defaults to the configured scenario).
    #[arg(long)]
    scenario: Option<String>,
    /// State to claim from.
    #[arg(long, default_value = "new")]
    from: RunState,
    /// State to move the claimed run to.
    #[arg(long, default_value = "active")]
    to: RunState,
}

/// Arguments for `deposit`.
#[derive(Args, Debug)]
struct DepositCommand {
    /// Parameter values as a JSON object.
    #[arg(long, value_name = "JSON")]
    params: String,
    /// Scalar misfit value.
    #[arg(long, conflicts_with = "result", required_unless_present = "result")]
    value: Option<f64>,
    /// JSON file holding a residual array or an observation-name object.
    #[arg(long, value_name = "FILE")]
    result: Option<PathBuf>,
    /// Scenario name (defaults to the configured scenario).
    #[arg(long)]
    scenario: Option<String>,
    /// Deposit even if the run is not active.
    #[arg(long)]
    force: bool,
}

/// Arguments for `state`.
#[derive(Args, Debug)]
struct StateCommand {
    /// Parameter values as a JSON object.
    #[arg(long, value_name = "JSON")]
    params: String,
    /// Scenario name (defaults to the configured scenario).
    #[arg(long)]
    scenario: Option<String>,
}

/// Arguments for `set-state`.
#[derive(Args, Debug)]
struct SetStateCommand {
    /// Run identifier.
    #[arg(long)]
    run_id: u64,
    /// New state.
    #[arg(long)]
    state: RunState,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying a message for stderr.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a message.
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    init_tracing();
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Installs the stderr log subscriber.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = LookupConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(err.to_string()))?;
    debug!(study = %config.setup.study, "loaded configuration");
    let objective = open_objective(&config)?;
    match cli.command {
        Commands::Init => command_init(&objective),
        Commands::Lookup(command) => command_lookup(&objective, &command),
        Commands::Claim(command) => command_claim(&objective, &command),
        Commands::Deposit(command) => command_deposit(&objective, &command),
        Commands::State(command) => command_state(&objective, &command),
        Commands::SetState(command) => command_set_state(&objective, &command),
        Commands::Scenarios => command_scenarios(&objective),
        Commands::Bounds => command_bounds(&objective),
    }
}

/// Opens the store, study and objective function named by `config`.
fn open_objective(config: &LookupConfig) -> CliResult<ObjectiveFunction<SqliteLookupStore>> {
    let store_config = config.store_config().map_err(|err| CliError::new(err.to_string()))?;
    let store =
        SqliteLookupStore::new(store_config).map_err(|err| CliError::new(err.to_string()))?;
    let spec = config.study_spec().map_err(|err| CliError::new(err.to_string()))?;
    let mut coordinator = LookupCoordinator::open(store, spec)
        .map_err(|err| CliError::new(err.to_string()))?
        .with_preliminary(config.setup.preliminary);
    if let Some(scenario) = &config.setup.scenario {
        coordinator.set_default_scenario(scenario).map_err(|err| CliError::new(err.to_string()))?;
    }
    ObjectiveFunction::new(coordinator, config.objective.kind, &config.setup.basedir)
        .map_err(|err| CliError::new(err.to_string()))
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes `init`.
fn command_init(objective: &ObjectiveFunction<SqliteLookupStore>) -> CliResult<ExitCode> {
    let coordinator = objective.coordinator();
    write_json(&json!({
        "study": coordinator.spec().name(),
        "study_id": coordinator.study_id().get(),
        "scenario": coordinator.default_scenario(),
        "kind": objective.kind().as_str(),
        "parameters": coordinator.spec().parameters().names(),
    }))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `lookup`.
fn command_lookup(
    objective: &ObjectiveFunction<SqliteLookupStore>,
    command: &LookupCommand,
) -> CliResult<ExitCode> {
    let values = parse_params(&command.params)?;
    let evaluation = objective
        .result(&values, command.scenario.as_deref())
        .map_err(|err| CliError::new(err.to_string()))?;
    write_json(&evaluation_json(&evaluation))?;
    Ok(evaluation_exit_code(&evaluation))
}

/// Executes `claim`.
fn command_claim(
    objective: &ObjectiveFunction<SqliteLookupStore>,
    command: &ClaimCommand,
) -> CliResult<ExitCode> {
    let outcome = objective
        .coordinator()
        .claim_with_state(command.scenario.as_deref(), command.from, command.to)
        .map_err(|err| CliError::new(err.to_string()))?;
    match outcome {
        ClaimOutcome::Claimed(claimed) => {
            write_json(&json!({
                "run_id": claimed.run_id.get(),
                "parameters": claimed.parameters,
            }))?;
            Ok(ExitCode::SUCCESS)
        }
        ClaimOutcome::NoPendingWork => {
            write_json(&json!({ "outcome": "no_pending_work" }))?;
            Ok(ExitCode::from(EXIT_NO_PENDING_WORK))
        }
    }
}

/// Executes `deposit`.
fn command_deposit(
    objective: &ObjectiveFunction<SqliteLookupStore>,
    command: &DepositCommand,
) -> CliResult<ExitCode> {
    let values = parse_params(&command.params)?;
    let payload = match (&command.result, command.value) {
        (Some(path), _) => read_result_payload(path, objective.kind())?,
        (None, Some(value)) => ResultPayload::Scalar(value),
        (None, None) => {
            return Err(CliError::new("either --value or --result is required".to_string()));
        }
    };
    match objective.deposit(&values, &payload, command.scenario.as_deref(), command.force) {
        Ok(run_id) => {
            write_json(&json!({ "run_id": run_id.get(), "state": RunState::Completed.as_str() }))?;
            Ok(ExitCode::SUCCESS)
        }
        Err(ObjectiveError::Coordinator(CoordinatorError::NotFound)) => not_found(),
        Err(err) => Err(CliError::new(err.to_string())),
    }
}

/// Executes `state`.
fn command_state(
    objective: &ObjectiveFunction<SqliteLookupStore>,
    command: &StateCommand,
) -> CliResult<ExitCode> {
    let values = parse_params(&command.params)?;
    match objective.coordinator().run(&values, command.scenario.as_deref()) {
        Ok(run) => {
            write_json(&json!({ "run_id": run.run_id.get(), "state": run.state.as_str() }))?;
            Ok(ExitCode::SUCCESS)
        }
        Err(CoordinatorError::NotFound) => not_found(),
        Err(err) => Err(CliError::new(err.to_string())),
    }
}

/// Executes `set-state`.
fn command_set_state(
    objective: &ObjectiveFunction<SqliteLookupStore>,
    command: &SetStateCommand,
) -> CliResult<ExitCode> {
    let Some(run_id) = RunId::from_raw(command.run_id) else {
        return not_found();
    };
    match objective.coordinator().set_state(run_id, command.state) {
        Ok(()) => {
            write_json(&json!({ "run_id": run_id.get(), "state": command.state.as_str() }))?;
            Ok(ExitCode::SUCCESS)
        }
        Err(CoordinatorError::RunNotFound(_)) => not_found(),
        Err(err) => Err(CliError::new(err.to_string())),
    }
}

/// Executes `scenarios`.
fn command_scenarios(objective: &ObjectiveFunction<SqliteLookupStore>) -> CliResult<ExitCode> {
    let scenarios =
        objective.coordinator().scenarios().map_err(|err| CliError::new(err.to_string()))?;
    write_json(&json!(scenarios))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `bounds`.
fn command_bounds(objective: &ObjectiveFunction<SqliteLookupStore>) -> CliResult<ExitCode> {
    let (names, kinds): (Vec<&str>, Vec<&str>) = objective
        .coordinator()
        .spec()
        .parameters()
        .active()
        .map(|(name, parameter)| (name, parameter.kind().as_str()))
        .unzip();
    write_json(&json!({
        "names": names,
        "kinds": kinds,
        "lower": objective.lower_bounds(),
        "upper": objective.upper_bounds(),
        "num_residuals": objective.num_residuals(),
    }))?;
    Ok(ExitCode::SUCCESS)
}

/// Reports a missing run.
fn not_found() -> CliResult<ExitCode> {
    write_json(&json!({ "outcome": "not_found" }))?;
    Ok(ExitCode::from(EXIT_NOT_FOUND))
}

// ============================================================================
// SECTION: Inputs
// ============================================================================

/// Parses a `--params` JSON object into parameter values.
fn parse_params(raw: &str) -> CliResult<ParameterValues> {
    if raw.len() > MAX_PARAMS_BYTES {
        return Err(CliError::new(format!(
            "--params exceeds size limit ({} > {MAX_PARAMS_BYTES} bytes)",
            raw.len()
        )));
    }
    serde_json::from_str::<BTreeMap<String, f64>>(raw)
        .map_err(|err| CliError::new(format!("--params must be a JSON object of numbers: {err}")))
}

/// Reads a vector payload file for the objective kind.
fn read_result_payload(path: &Path, kind: PayloadKind) -> CliResult<ResultPayload> {
    let bytes = read_bytes_with_limit(path, MAX_RESULT_BYTES).map_err(|err| match err {
        ReadLimitError::Io(err) => {
            CliError::new(format!("failed to read {}: {err}", path.display()))
        }
        ReadLimitError::TooLarge {
            size,
            limit,
        } => CliError::new(format!(
            "{} exceeds size limit ({size} > {limit} bytes)",
            path.display()
        )),
    })?;
    let invalid = |err: serde_json::Error| {
        CliError::new(format!("invalid {kind} payload in {}: {err}", path.display()))
    };
    match kind {
        PayloadKind::Misfit => {
            serde_json::from_slice::<f64>(&bytes).map(ResultPayload::Scalar).map_err(invalid)
        }
        PayloadKind::Residual => serde_json::from_slice::<Vec<f64>>(&bytes)
            .map(ResultPayload::Residuals)
            .map_err(invalid),
        PayloadKind::SimObs => serde_json::from_slice::<BTreeMap<String, f64>>(&bytes)
            .map(ResultPayload::NamedSeries)
            .map_err(invalid),
    }
}

/// Errors returned by bounded file reads.
#[derive(Debug)]
enum ReadLimitError {
    /// File I/O failure.
    Io(std::io::Error),
    /// File size exceeds the configured limit.
    TooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Allowed limit in bytes.
        limit: usize,
    },
}

/// Reads a file from disk while enforcing a hard size limit.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path).map_err(ReadLimitError::Io)?;
    let size = file.metadata().map_err(ReadLimitError::Io)?.len();
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX);
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut bytes).map_err(ReadLimitError::Io)?;
    if bytes.len() > max_bytes {
        return Err(ReadLimitError::TooLarge {
            size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

// ============================================================================
// SECTION: Outputs
// ============================================================================

/// Renders an evaluation as JSON.
///
/// Placeholders carry their synthetic value under `value`; `outcome`
/// distinguishes them from stored results.
fn evaluation_json(evaluation: &Evaluation<ObjectiveValue>) -> Value {
    match evaluation.value() {
        Some(ObjectiveValue::Scalar(scalar)) => {
            json!({ "outcome": evaluation.label(), "value": scalar })
        }
        Some(ObjectiveValue::Vector(vector)) => {
            json!({ "outcome": evaluation.label(), "value": vector })
        }
        None => json!({ "outcome": evaluation.label() }),
    }
}

/// Maps an evaluation to the process exit code.
fn evaluation_exit_code<T>(evaluation: &Evaluation<T>) -> ExitCode {
    match evaluation {
        Evaluation::Value(_) | Evaluation::Placeholder(_) => ExitCode::SUCCESS,
        Evaluation::PreliminaryRun => ExitCode::from(EXIT_PRELIMINARY_RUN),
        Evaluation::NewRun => ExitCode::from(EXIT_NEW_RUN),
        Evaluation::Waiting => ExitCode::from(EXIT_WAITING),
    }
}

/// Writes one JSON document to stdout.
fn write_json(value: &Value) -> CliResult<()> {
    let rendered = serde_json::to_string(value)
        .map_err(|err| CliError::new(format!("failed to render output: {err}")))?;
    write_stdout_line(&rendered)
        .map_err(|err| CliError::new(format!("failed to write to stdout: {err}")))
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
