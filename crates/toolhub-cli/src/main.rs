// crates/toolhub-cli/src/main.rs
// ============================================================================
// Module: Toolhub CLI Entry Point
// Description: Command dispatcher for serving, updating, and configuring Toolhub.
// Purpose: Provide the `toolhub` binary.
// Dependencies: clap, tokio, toolhub-config, toolhub-core, toolhub-mcp, toolhub-update
// ============================================================================

//! ## Overview
//! `toolhub serve` runs the MCP server over stdio or HTTP with the management
//! API beside it. `update` and `version` manage the installed binary, and
//! `config` and `tools` edit `<data_dir>/config.toml` offline; a running
//! server picks those edits up on its next read.
//!
//! Standard output carries command results only. With the stdio transport it
//! carries JSON-RPC and nothing else; diagnostics go to the log file.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;
use std::io::Write;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use toolhub_config::Config;
use toolhub_config::ConfigError;
use toolhub_config::ConfigStore;
use toolhub_config::config_path;
use toolhub_config::log_path;
use toolhub_config::resolve_bind_host;
use toolhub_config::resolve_data_dir;
use toolhub_config::resolve_port;
use toolhub_core::TelemetryBus;
use toolhub_core::ToolStatus;
use toolhub_core::tool_statuses;
use toolhub_mcp::AppState;
use toolhub_mcp::BuiltinContext;
use toolhub_mcp::DiagnosticRecord;
use toolhub_mcp::DiagnosticSink;
use toolhub_mcp::FileDiagnosticSink;
use toolhub_mcp::McpServer;
use toolhub_mcp::ServerOptions;
use toolhub_mcp::StderrDiagnosticSink;
use toolhub_mcp::Transport;
use toolhub_mcp::builtin_catalog;
use toolhub_mcp::builtin_dispatcher;
use toolhub_update::UpdateCheck;
use toolhub_update::UpdateError;
use toolhub_update::UpdateManager;
use toolhub_update::UpdateManagerConfig;
use toolhub_update::UpdateOutcome;
use toolhub_update::UpdatePhase;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Program name used in user-facing output.
const PROGRAM: &str = "toolhub";

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "toolhub", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Data directory (overrides `TOOLHUB_DATA_DIR`).
    #[arg(long, value_name = "PATH", global = true)]
    data_dir: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the MCP server.
    Serve(ServeCommand),
    /// Print version information.
    Version,
    /// Check for and install a newer release.
    Update(UpdateCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Tool enablement utilities.
    Tools {
        /// Selected tools subcommand.
        #[command(subcommand)]
        command: ToolsCommand,
    },
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Protocol transport.
    #[arg(long, value_enum, default_value_t = TransportArg::Stdio)]
    transport: TransportArg,
    /// Port for HTTP and the management API (overrides `TOOLHUB_PORT`).
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,
    /// Do not serve the management API.
    #[arg(long)]
    no_dashboard: bool,
}

/// Transport selection for `serve`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum TransportArg {
    /// Newline-delimited JSON-RPC on stdin/stdout.
    Stdio,
    /// JSON-RPC over HTTP `POST /mcp`.
    Http,
}

impl From<TransportArg> for Transport {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Stdio => Self::Stdio,
            TransportArg::Http => Self::Http,
        }
    }
}

/// Arguments for `update`.
#[derive(Args, Debug)]
struct UpdateCommand {
    /// Only report whether an update is available.
    #[arg(long)]
    check: bool,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the configuration as JSON with secrets masked.
    Show,
    /// Print one value.
    Get(ConfigPathArgs),
    /// Set one value; JSON literals are parsed, anything else is a string.
    Set(ConfigSetArgs),
    /// Remove one value.
    Unset(ConfigPathArgs),
}

/// Dotted configuration path argument.
#[derive(Args, Debug)]
struct ConfigPathArgs {
    /// Dotted path, e.g. `apiKeys.search`.
    #[arg(value_name = "PATH")]
    path: String,
}

/// Arguments for `config set`.
#[derive(Args, Debug)]
struct ConfigSetArgs {
    /// Dotted path, e.g. `webhooks.url`.
    #[arg(value_name = "PATH")]
    path: String,
    /// New value.
    #[arg(value_name = "VALUE")]
    value: String,
}

/// Tools subcommands.
#[derive(Subcommand, Debug)]
enum ToolsCommand {
    /// List every tool with its resolved state.
    List,
    /// Enable a tool explicitly.
    Enable(ToolNameArgs),
    /// Disable a tool explicitly.
    Disable(ToolNameArgs),
    /// Remove a tool's explicit override.
    Reset(ToolNameArgs),
}

/// Tool name argument.
#[derive(Args, Debug)]
struct ToolNameArgs {
    /// Tool name as listed by `toolhub tools list`.
    #[arg(value_name = "NAME")]
    name: String,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying the message shown to the user.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
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
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let Cli {
        data_dir,
        command,
    } = Cli::parse();
    let data_dir = data_dir.as_deref();
    match command {
        Commands::Serve(command) => command_serve(data_dir, &command).await,
        Commands::Version => command_version(),
        Commands::Update(command) => command_update(data_dir, &command).await,
        Commands::Config {
            command,
        } => command_config(data_dir, command),
        Commands::Tools {
            command,
        } => command_tools(data_dir, command),
    }
}

/// Resolves the data directory and opens its configuration store.
fn open_store(flag: Option<&Path>) -> CliResult<(PathBuf, Arc<ConfigStore>)> {
    let data_dir = resolve_data_dir(flag).map_err(config_error)?;
    let store = ConfigStore::open(config_path(&data_dir)).map_err(config_error)?;
    Ok((data_dir, Arc::new(store)))
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(data_dir: Option<&Path>, command: &ServeCommand) -> CliResult<ExitCode> {
    let (data_dir, store) = open_store(data_dir)?;
    let config = store.snapshot();
    let port = resolve_port(command.port, &config).map_err(config_error)?;
    let bind = bind_address(&resolve_bind_host(&config), port)?;
    let diagnostics = open_diagnostics(&data_dir);
    let updater = match build_updater(&config) {
        Ok(updater) => Some(Arc::new(updater)),
        Err(err) => {
            diagnostics
                .record(&DiagnosticRecord::notice(format!("self-update unavailable: {err}")));
            None
        }
    };

    let context = BuiltinContext::new(TelemetryBus::default(), store, updater.clone())
        .map_err(|err| CliError::new(format!("serve failed: {err}")))?;
    let dispatcher = builtin_dispatcher(&context)
        .map_err(|err| CliError::new(format!("serve failed: {err}")))?;
    let state = AppState::new(dispatcher, updater, diagnostics);
    let options = ServerOptions {
        transport: command.transport.into(),
        bind,
        management: !command.no_dashboard,
    };
    McpServer::new(state, options)
        .serve()
        .await
        .map_err(|err| CliError::new(format!("serve failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Opens the diagnostic log, falling back to stderr.
fn open_diagnostics(data_dir: &Path) -> Arc<dyn DiagnosticSink> {
    let path = log_path(data_dir);
    match FileDiagnosticSink::new(&path) {
        Ok(sink) => Arc::new(sink),
        Err(err) => {
            let _ = write_stderr_line(&format!(
                "warning: cannot open {} ({err}); logging to stderr",
                path.display()
            ));
            Arc::new(StderrDiagnosticSink)
        }
    }
}

/// Parses the configured bind host.
fn bind_address(host: &str, port: u16) -> CliResult<SocketAddr> {
    let ip: IpAddr =
        host.parse().map_err(|_| CliError::new(format!("invalid bind address: {host}")))?;
    Ok(SocketAddr::new(ip, port))
}

// ============================================================================
// SECTION: Version and Update Commands
// ============================================================================

/// Executes the `version` command.
fn command_version() -> CliResult<ExitCode> {
    write_stdout_line(&format!("{PROGRAM} {}", env!("CARGO_PKG_VERSION"))).map_err(stdout_error)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `update` command.
async fn command_update(data_dir: Option<&Path>, command: &UpdateCommand) -> CliResult<ExitCode> {
    let (_, store) = open_store(data_dir)?;
    let updater = build_updater(&store.snapshot()).map_err(update_error)?;
    let observer = |phase: UpdatePhase, detail: &str| {
        let _ = write_stdout_line(&phase_line(phase, detail));
    };
    let summary = if command.check {
        check_summary(&updater.check(&observer).await.map_err(update_error)?)
    } else {
        outcome_summary(&updater.update(&observer).await.map_err(update_error)?)
    };
    write_stdout_line(&summary).map_err(stdout_error)?;
    Ok(ExitCode::SUCCESS)
}

/// Builds the update manager for the running executable.
fn build_updater(config: &Config) -> Result<UpdateManager, UpdateError> {
    let install = std::env::current_exe().map_err(|err| UpdateError::Io(err.to_string()))?;
    UpdateManager::new(updater_settings(config, install))
}

/// Applies the `[update]` section to default manager settings.
fn updater_settings(config: &Config, install: PathBuf) -> UpdateManagerConfig {
    let mut settings = UpdateManagerConfig::new(env!("CARGO_PKG_VERSION"), install);
    if let Some(url) =
        config.update.release_url.as_deref().map(str::trim).filter(|url| !url.is_empty())
    {
        settings.release_url = url.to_string();
    }
    settings.allow_http = config.update.allow_http;
    settings
}

/// Formats one progress line.
fn phase_line(phase: UpdatePhase, detail: &str) -> String {
    format!("[{}] {detail}", phase.as_str())
}

/// Summarizes an update check.
fn check_summary(check: &UpdateCheck) -> String {
    match check {
        UpdateCheck::UpToDate {
            current_version,
            latest_version,
        } => format!("{PROGRAM} {current_version} is up to date (latest release {latest_version})"),
        UpdateCheck::Available(info) => format!(
            "update available: {} -> {} (run `{PROGRAM} update` to install)",
            info.current_version, info.latest_version
        ),
    }
}

/// Summarizes a completed update run.
fn outcome_summary(outcome: &UpdateOutcome) -> String {
    match outcome {
        UpdateOutcome::UpToDate {
            current_version,
        } => format!("{PROGRAM} {current_version} is up to date"),
        UpdateOutcome::Updated {
            from,
            to,
        } => format!("updated {PROGRAM} {from} -> {to}; restart running servers to use it"),
    }
}

// ============================================================================
// SECTION: Config Command
// ============================================================================

/// Executes `config` subcommands.
fn command_config(data_dir: Option<&Path>, command: ConfigCommand) -> CliResult<ExitCode> {
    let (_, store) = open_store(data_dir)?;
    match command {
        ConfigCommand::Show => write_json(&store.redacted())?,
        ConfigCommand::Get(args) => {
            let view = store.redacted();
            let value = lookup_path(&view, &args.path)?
                .ok_or_else(|| CliError::new(format!("{} is not set", args.path)))?;
            write_stdout_line(&render_value(value)).map_err(stdout_error)?;
        }
        ConfigCommand::Set(args) => {
            let patch = nested_patch(&args.path, parse_config_value(&args.value))?;
            store.merge(&patch).map_err(config_error)?;
            write_stdout_line(&format!("set {}", args.path)).map_err(stdout_error)?;
        }
        ConfigCommand::Unset(args) => {
            let message = if lookup_path(&store.redacted(), &args.path)?.is_some() {
                store.merge(&nested_patch(&args.path, Value::Null)?).map_err(config_error)?;
                format!("removed {}", args.path)
            } else {
                format!("{} was not set", args.path)
            };
            write_stdout_line(&message).map_err(stdout_error)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Splits a dotted path, rejecting empty segments.
fn path_segments(path: &str) -> CliResult<Vec<&str>> {
    let segments: Vec<&str> = path.split('.').map(str::trim).collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(CliError::new(format!("invalid config path: {path:?}")));
    }
    Ok(segments)
}

/// Resolves a dotted path against a JSON view of the configuration.
fn lookup_path<'a>(view: &'a Value, path: &str) -> CliResult<Option<&'a Value>> {
    let mut current = view;
    for segment in path_segments(path)? {
        match current.get(segment) {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Wraps `value` in nested objects along `path`.
fn nested_patch(path: &str, value: Value) -> CliResult<Value> {
    let mut patch = value;
    for segment in path_segments(path)?.into_iter().rev() {
        let mut map = Map::new();
        map.insert(segment.to_string(), patch);
        patch = Value::Object(map);
    }
    Ok(patch)
}

/// Parses a JSON literal, falling back to a plain string.
fn parse_config_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Renders strings bare and everything else as pretty JSON.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

// ============================================================================
// SECTION: Tools Command
// ============================================================================

/// Executes `tools` subcommands.
fn command_tools(data_dir: Option<&Path>, command: ToolsCommand) -> CliResult<ExitCode> {
    let (_, store) = open_store(data_dir)?;
    let catalog =
        builtin_catalog().map_err(|err| CliError::new(format!("catalog error: {err}")))?;
    let (name, enabled) = match command {
        ToolsCommand::List => {
            let statuses = tool_statuses(&catalog, &store.snapshot());
            write_stdout_line(&render_tool_table(&statuses)).map_err(stdout_error)?;
            return Ok(ExitCode::SUCCESS);
        }
        ToolsCommand::Enable(args) => (args.name, Some(true)),
        ToolsCommand::Disable(args) => (args.name, Some(false)),
        ToolsCommand::Reset(args) => (args.name, None),
    };
    if catalog.tool(&name).is_none() {
        return Err(CliError::new(format!("unknown tool: {name}")));
    }
    let config = store.set_tool_override(&name, enabled).map_err(config_error)?;
    let status = tool_statuses(&catalog, &config)
        .into_iter()
        .find(|status| status.name == name)
        .ok_or_else(|| CliError::new(format!("unknown tool: {name}")))?;
    write_stdout_line(&describe_status(&status)).map_err(stdout_error)?;
    Ok(ExitCode::SUCCESS)
}

/// Renders the `tools list` table.
fn render_tool_table(statuses: &[ToolStatus]) -> String {
    let name_width = statuses.iter().map(|status| status.name.len()).max().unwrap_or(0).max(4);
    let group_width = statuses
        .iter()
        .map(|status| status.group.as_deref().map_or(1, str::len))
        .max()
        .unwrap_or(0)
        .max(5);
    let header =
        format!("{:<name_width$}  {:<group_width$}  {:<8}  NOTES", "NAME", "GROUP", "STATE");
    let mut lines = vec![header];
    for status in statuses {
        let group = status.group.as_deref().unwrap_or("-");
        let row = format!(
            "{:<name_width$}  {group:<group_width$}  {:<8}  {}",
            status.name,
            state_label(status),
            status_notes(status)
        );
        lines.push(row.trim_end().to_string());
    }
    lines.join("\n")
}

/// One-line summary after an override change.
fn describe_status(status: &ToolStatus) -> String {
    let mut line = format!("{}: {}", status.name, state_label(status));
    let notes = status_notes(status);
    if !notes.is_empty() {
        let _ = write!(line, " ({notes})");
    }
    line
}

/// Returns `enabled` or `disabled`.
const fn state_label(status: &ToolStatus) -> &'static str {
    if status.enabled { "enabled" } else { "disabled" }
}

/// Override, missing configuration, and remote markers for a tool.
fn status_notes(status: &ToolStatus) -> String {
    let mut notes = Vec::new();
    if let Some(enabled) = status.explicit_override {
        notes.push(format!("override={enabled}"));
    }
    if !status.missing.is_empty() {
        notes.push(format!("missing: {}", status.missing.join(", ")));
    }
    if status.remote {
        notes.push("remote".to_string());
    }
    notes.join("; ")
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

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

/// Writes pretty JSON to stdout.
fn write_json(value: &Value) -> CliResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::new(format!("failed to render json: {err}")))?;
    write_stdout_line(&rendered).map_err(stdout_error)
}

/// Maps a stdout failure.
fn stdout_error(err: std::io::Error) -> CliError {
    CliError::new(format!("failed to write to stdout: {err}"))
}

/// Maps a configuration failure.
fn config_error(err: ConfigError) -> CliError {
    CliError::new(err.to_string())
}

/// Maps an update failure.
fn update_error(err: UpdateError) -> CliError {
    CliError::new(format!("update failed: {err}"))
}

/// Prints an error and returns a failing exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(&format!("error: {message}"));
    ExitCode::FAILURE
}
