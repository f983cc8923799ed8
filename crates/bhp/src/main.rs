mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "bhp", version, about = "Host proxy client for trusted applets")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Proxy configuration file (JSON).
    #[arg(long, value_name = "FILE", env = "BHP_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    match cmd::run(cli.command, format, cli.config.as_deref()) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_session_subcommand() {
        let cli = Cli::try_parse_from([
            "bhp",
            "session",
            "--ivm",
            "/tmp/ivm.sock",
            "--applet",
            "3c4724a3-b9b6-4a4b-a3f8-95cd8a2a0a86",
            "--package",
            "/tmp/applet.pack",
            "--command",
            "1",
            "--data",
            "hello",
        ])
        .expect("session args should parse");

        assert!(matches!(cli.command, Command::Session(_)));
    }

    #[test]
    fn rejects_conflicting_input_args() {
        let err = Cli::try_parse_from([
            "bhp",
            "session",
            "--ivm",
            "/tmp/ivm.sock",
            "--applet",
            "x",
            "--package",
            "p",
            "--command",
            "1",
            "--data",
            "hello",
            "--file",
            "/tmp/input.bin",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_screen_lists() {
        let cli = Cli::try_parse_from([
            "bhp",
            "--format",
            "raw",
            "screen",
            "/tmp/frame.bin",
            "--allow-commands",
            "list-packages,open-session",
            "--deny-applet",
            "3c4724a3-b9b6-4a4b-a3f8-95cd8a2a0a86",
        ])
        .expect("screen args should parse");

        assert_eq!(cli.format, Some(OutputFormat::Raw));
        match cli.command {
            Command::Screen(args) => {
                assert_eq!(args.allow_commands.map(|ids| ids.len()), Some(2));
                assert_eq!(args.deny_applet.len(), 1);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn negative_applet_command_parses() {
        let cli = Cli::try_parse_from([
            "bhp",
            "session",
            "--ivm",
            "i",
            "--applet",
            "a",
            "--package",
            "p",
            "--command",
            "-3",
        ])
        .expect("negative command ids are allowed");
        match cli.command {
            Command::Session(args) => assert_eq!(args.command, -3),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
