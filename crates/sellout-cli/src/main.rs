// crates/sellout-cli/src/main.rs
// ============================================================================
// Module: Sellout Ingest CLI Entry Point
// Description: Command dispatcher for the ingestion server and store admin.
// Purpose: Run the HTTP server and seed users and data sources offline.
// Dependencies: clap, sellout-config, sellout-server, sellout-store-sqlite, tokio
// ============================================================================

//! ## Overview
//! `sellout-ingest` starts the extracted-data server and provides the small
//! set of offline commands operators need around it: validating config,
//! registering users and data sources, and listing recent runs straight from
//! the `SQLite` store.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use sellout_config::SelloutConfig;
use sellout_config::StoreType;
use sellout_core::ExternalIdentity;
use sellout_core::ExtractionRunStore;
use sellout_server::SelloutServer;
use sellout_store_sqlite::SqliteIngestStore;
use sellout_store_sqlite::SqliteStoreConfig;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Default number of runs printed by `runs list`.
const DEFAULT_RUN_LIMIT: usize = 20;
/// Largest accepted `runs list --limit`.
const MAX_RUN_LIMIT: usize = 500;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "sellout-ingest", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the extracted-data HTTP server.
    Serve(ServeCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Back-office user administration.
    User {
        /// Selected user subcommand.
        #[command(subcommand)]
        command: UserCommand,
    },
    /// Data source administration.
    Source {
        /// Selected source subcommand.
        #[command(subcommand)]
        command: SourceCommand,
    },
    /// Extraction run inspection.
    Runs {
        /// Selected runs subcommand.
        #[command(subcommand)]
        command: RunsCommand,
    },
}

/// Configuration for the `serve` command.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional config file path (defaults to sellout-ingest.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate a configuration file.
    Check(ConfigCheckCommand),
}

/// Arguments for `config check`.
#[derive(Args, Debug)]
struct ConfigCheckCommand {
    /// Optional config file path (defaults to sellout-ingest.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// User subcommands.
#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Register a user or update an existing one.
    Add(UserAddCommand),
}

/// Source subcommands.
#[derive(Subcommand, Debug)]
enum SourceCommand {
    /// Register a data source.
    Add(SourceAddCommand),
}

/// Runs subcommands.
#[derive(Subcommand, Debug)]
enum RunsCommand {
    /// Print recent runs, newest first, as JSON lines.
    List(RunsListCommand),
}

/// Store location inputs for `SQLite`-backed admin commands.
#[derive(Args, Debug, Clone)]
struct StoreLocationArgs {
    /// Optional config file path (defaults to sellout-ingest.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Optional direct `SQLite` store path (overrides config).
    #[arg(long = "store-path", value_name = "PATH")]
    store_path: Option<PathBuf>,
}

/// Arguments for `user add`.
#[derive(Args, Debug)]
struct UserAddCommand {
    /// Store location settings.
    #[command(flatten)]
    location: StoreLocationArgs,
    /// Identity provider subject, as forwarded in the identity header.
    #[arg(long = "external-id", value_name = "ID")]
    external_id: String,
    /// Display name.
    #[arg(long, value_name = "NAME")]
    name: String,
    /// Register the user as inactive.
    #[arg(long, action = ArgAction::SetTrue)]
    inactive: bool,
}

/// Arguments for `source add`.
#[derive(Args, Debug)]
struct SourceAddCommand {
    /// Store location settings.
    #[command(flatten)]
    location: StoreLocationArgs,
    /// Data source name.
    #[arg(long, value_name = "NAME")]
    name: String,
    /// Register the source as inactive.
    #[arg(long, action = ArgAction::SetTrue)]
    inactive: bool,
}

/// Arguments for `runs list`.
#[derive(Args, Debug)]
struct RunsListCommand {
    /// Store location settings.
    #[command(flatten)]
    location: StoreLocationArgs,
    /// Maximum number of runs to print.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_RUN_LIMIT)]
    limit: usize,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying a one-line message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();

    if cli.show_version {
        write_stdout_line(&format!("sellout-ingest {}", env!("CARGO_PKG_VERSION")))?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    match command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Config {
            command,
        } => match command {
            ConfigCommand::Check(command) => command_config_check(&command),
        },
        Commands::User {
            command,
        } => match command {
            UserCommand::Add(command) => command_user_add(&command),
        },
        Commands::Source {
            command,
        } => match command {
            SourceCommand::Add(command) => command_source_add(&command),
        },
        Commands::Runs {
            command,
        } => match command {
            RunsCommand::List(command) => command_runs_list(&command),
        },
    }
}

/// Prints top-level help.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    command.print_help().map_err(|err| output_error("stdout", &err))?;
    write_stdout_line("")
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = SelloutConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    let server = tokio::task::spawn_blocking(move || SelloutServer::from_config(config))
        .await
        .map_err(|err| CliError::new(format!("server init failed: init join failed: {err}")))?
        .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    server.serve().await.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Executes `config check`.
fn command_config_check(command: &ConfigCheckCommand) -> CliResult<ExitCode> {
    let _config = SelloutConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    write_stdout_line("config ok")?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Admin Commands
// ============================================================================

/// Executes `user add`.
fn command_user_add(command: &UserAddCommand) -> CliResult<ExitCode> {
    let external_id = ExternalIdentity::new(command.external_id.trim());
    if external_id.is_empty() {
        return Err(CliError::new("--external-id must not be empty"));
    }
    let store = open_sqlite_store(&command.location)?;
    let user = store
        .upsert_user(&external_id, &command.name, !command.inactive)
        .map_err(|err| CliError::new(format!("failed to add user: {err}")))?;
    write_json_line(&user)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `source add`.
fn command_source_add(command: &SourceAddCommand) -> CliResult<ExitCode> {
    let name = command.name.trim();
    if name.is_empty() {
        return Err(CliError::new("--name must not be empty"));
    }
    let store = open_sqlite_store(&command.location)?;
    let source = store
        .add_data_source(name, !command.inactive)
        .map_err(|err| CliError::new(format!("failed to add data source: {err}")))?;
    write_json_line(&source)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `runs list`.
fn command_runs_list(command: &RunsListCommand) -> CliResult<ExitCode> {
    let limit = validate_run_limit(command.limit)?;
    let store = open_sqlite_store(&command.location)?;
    let runs = store
        .list_runs(limit)
        .map_err(|err| CliError::new(format!("failed to list runs: {err}")))?;
    for run in &runs {
        write_json_line(run)?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Rejects run limits outside `1..=MAX_RUN_LIMIT`.
fn validate_run_limit(limit: usize) -> CliResult<usize> {
    if limit == 0 || limit > MAX_RUN_LIMIT {
        return Err(CliError::new(format!("--limit must be between 1 and {MAX_RUN_LIMIT}")));
    }
    Ok(limit)
}

// ============================================================================
// SECTION: Store Resolution
// ============================================================================

/// Resolves the `SQLite` store configuration from `--store-path` or config.
///
/// An explicit store path keeps the tuning from the config file when one is
/// given. Without a store path the config must select the sqlite backend.
fn resolve_sqlite_store_config(location: &StoreLocationArgs) -> CliResult<SqliteStoreConfig> {
    if let Some(store_path) = &location.store_path {
        let Some(config_path) = location.config.as_deref() else {
            return Ok(SqliteStoreConfig::at(store_path.clone()));
        };
        let config = SelloutConfig::load(Some(config_path))
            .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
        return Ok(SqliteStoreConfig {
            path: store_path.clone(),
            busy_timeout_ms: config.store.busy_timeout_ms,
            journal_mode: config.store.journal_mode,
            sync_mode: config.store.sync_mode,
        });
    }

    let config = SelloutConfig::load(location.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    if config.store.store_type != StoreType::Sqlite {
        return Err(CliError::new("admin commands require a sqlite store"));
    }
    let path = config
        .store
        .path
        .clone()
        .ok_or_else(|| CliError::new("sqlite store requires path"))?;
    Ok(SqliteStoreConfig {
        path,
        busy_timeout_ms: config.store.busy_timeout_ms,
        journal_mode: config.store.journal_mode,
        sync_mode: config.store.sync_mode,
    })
}

/// Opens the `SQLite` store named by `location`.
fn open_sqlite_store(location: &StoreLocationArgs) -> CliResult<SqliteIngestStore> {
    let config = resolve_sqlite_store_config(location)?;
    SqliteIngestStore::new(&config)
        .map_err(|err| CliError::new(format!("failed to open store: {err}")))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Serializes `value` as compact JSON on one stdout line.
fn write_json_line<T: serde::Serialize>(value: &T) -> CliResult<()> {
    let line = serde_json::to_string(value)
        .map_err(|err| CliError::new(format!("failed to serialize output: {err}")))?;
    write_stdout_line(&line)
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}").map_err(|err| output_error("stdout", &err))
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output stream failure.
fn output_error(stream: &str, error: &std::io::Error) -> CliError {
    CliError::new(format!("failed to write to {stream}: {error}"))
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
