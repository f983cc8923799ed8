use std::path::{Path, PathBuf};
use std::time::Duration;

use bhp_proxy::ProxyConfig;
use bhp_wire::CommandId;
use clap::{Args, Subcommand};

use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, USAGE};
use crate::output::OutputFormat;

pub mod inspect;
pub mod packages;
pub mod screen;
pub mod session;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a command or response frame and print its fields.
    Inspect(InspectArgs),
    /// Run a command frame through the inbound filter chain.
    Screen(ScreenArgs),
    /// Open a session, send one command, and close the session.
    Session(SessionArgs),
    /// List applet packages resident in the VM.
    Packages(PackagesArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, config: Option<&Path>) -> CliResult<i32> {
    match command {
        Command::Inspect(args) => inspect::run(args, format),
        Command::Screen(args) => screen::run(args, format),
        Command::Session(args) => session::run(args, format, load_config(config)?),
        Command::Packages(args) => packages::run(args, format, load_config(config)?),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// File holding one frame.
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct ScreenArgs {
    /// File holding one command frame.
    pub path: PathBuf,
    /// Permit only these commands (names or numeric ids, comma-separated).
    #[arg(long, value_delimiter = ',', value_parser = parse_command_id)]
    pub allow_commands: Option<Vec<CommandId>>,
    /// Refuse to open sessions with this applet (repeatable).
    #[arg(long, value_name = "UUID")]
    pub deny_applet: Vec<String>,
    /// Largest acceptable frame length in bytes.
    #[arg(long)]
    pub max_length: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SessionArgs {
    /// Socket serving the IVM.
    #[arg(long, value_name = "SOCKET")]
    pub ivm: PathBuf,
    /// Socket serving the SVM; enables the blocked-state check.
    #[arg(long, value_name = "SOCKET")]
    pub svm: Option<PathBuf>,
    /// Applet id (UUID, with or without hyphens).
    #[arg(long)]
    pub applet: String,
    /// Applet package to download if the VM lacks it.
    #[arg(long, value_name = "FILE")]
    pub package: PathBuf,
    /// Session init data.
    #[arg(long)]
    pub init: Option<String>,
    /// Applet command id.
    #[arg(long, allow_negative_numbers = true)]
    pub command: i32,
    /// Raw string input.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read input from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Largest output accepted, in bytes.
    #[arg(long, default_value_t = 4096)]
    pub capacity: usize,
    /// Response timeout (e.g. 5s, 500ms); overrides the config file.
    #[arg(long)]
    pub timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct PackagesArgs {
    /// Socket serving the IVM.
    #[arg(long, value_name = "SOCKET")]
    pub ivm: PathBuf,
    /// Response timeout (e.g. 5s, 500ms); overrides the config file.
    #[arg(long)]
    pub timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn load_config(path: Option<&Path>) -> CliResult<ProxyConfig> {
    let Some(path) = path else {
        return Ok(ProxyConfig::default());
    };
    let raw = read_file(path)?;
    ProxyConfig::from_json(&raw).map_err(|err| {
        CliError::new(
            DATA_INVALID,
            format!("invalid config {}: {err}", path.display()),
        )
    })
}

pub(crate) fn read_file(path: &Path) -> CliResult<Vec<u8>> {
    std::fs::read(path).map_err(|err| io_error(&format!("read {}", path.display()), err))
}

pub(crate) fn apply_timeout(config: &mut ProxyConfig, timeout: Option<&str>) -> CliResult<()> {
    if let Some(timeout) = timeout {
        config.response_timeout = Some(parse_timeout(timeout)?);
    }
    Ok(())
}

fn parse_command_id(input: &str) -> Result<CommandId, String> {
    if let Ok(raw) = input.parse::<u32>() {
        return Ok(CommandId::from(raw));
    }
    [
        CommandId::DownloadPackage,
        CommandId::OpenSession,
        CommandId::CloseSession,
        CommandId::SendAndRecv,
        CommandId::ListPackages,
        CommandId::CheckBlockedState,
    ]
    .into_iter()
    .find(|id| id.name() == input)
    .ok_or_else(|| format!("unknown command {input:?}"))
}

fn parse_timeout(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    let (number, millis) = match input.strip_suffix("ms") {
        Some(number) => (number, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input:?}")))?;
    if value == 0 {
        return Err(CliError::usage("timeout must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
