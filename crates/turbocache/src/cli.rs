//! Command-line surface and error-to-exit-code mapping

use clap::{Parser, Subcommand};
use miette::{Diagnostic, Report};
use std::io::{self, Write};
use thiserror::Error;

/// Exit codes for the CLI application
pub const EXIT_OK: i32 = 0;
/// Unexpected failure exit code
pub const EXIT_FAILURE: i32 = 1;
/// Configuration error exit code
pub const EXIT_CONFIG: i32 = 2;

/// CLI-specific error types with proper exit code mapping
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CliError {
    /// Configuration error (exit code 2)
    #[error("Configuration error: {message}")]
    #[diagnostic(code(turbocache::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Any other failure (exit code 1)
    #[error("{message}")]
    #[diagnostic(code(turbocache::cli::other))]
    Other {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new other error
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new other error with help text
    #[must_use]
    pub fn other_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

/// Configuration problems keep their help text and exit with code 2;
/// everything else is a plain failure.
impl From<turbocache_core::Error> for CliError {
    fn from(err: turbocache_core::Error) -> Self {
        match err {
            // Extract the message to avoid "Configuration error: Configuration error:"
            turbocache_core::Error::Configuration { message, help } => {
                Self::Config { message, help }
            }
            turbocache_core::Error::Io { .. } => Self::other_with_help(
                err.to_string(),
                "Check file permissions and ensure the path exists",
            ),
            other => Self::other(other.to_string()),
        }
    }
}

/// Map CLI error to appropriate exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } => EXIT_CONFIG,
        CliError::Other { .. } => EXIT_FAILURE,
    }
}

/// Render an error to stderr with miette.
#[allow(clippy::print_stderr)]
pub fn render_error(err: &CliError) {
    let report = Report::new(err.clone());
    eprintln!("{report:?}");
    let _ = io::stderr().flush();
}

/// Local Turborepo remote cache daemon.
#[derive(Parser, Debug)]
#[command(name = "turbocache")]
#[command(about = "Serve the Turborepo remote cache API from a local daemon")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute; `start` when omitted.
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Logging verbosity level.
    #[arg(
        short = 'L',
        long,
        global = true,
        help = "Set logging level",
        default_value = "info",
        value_enum
    )]
    pub level: crate::tracing::LogLevel,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    pub json_logs: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Launch the daemon in the background and export the Turbo variables.
    Start,
    /// Run the cache server in the foreground.
    Serve,
    /// Run the provider self-test against the running daemon.
    Ping,
    /// Ask the running daemon to shut down.
    Kill,
    /// Shut the daemon down and print its log (CI post step).
    Post,
}

impl Cli {
    /// The subcommand to run, defaulting to `start`.
    #[must_use]
    pub fn command(&self) -> Commands {
        self.command.unwrap_or(Commands::Start)
    }
}

/// Parse command line arguments into a CLI structure.
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}
