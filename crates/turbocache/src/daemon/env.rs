//! Exports the variables that point Turborepo at the daemon.

use crate::cli::CliError;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Token and team handed to Turborepo; the daemon does not check them.
pub const TURBO_CREDENTIAL: &str = "turbogha";

/// `TURBOCACHE_PORT`, `TURBO_API`, `TURBO_TOKEN` and `TURBO_TEAM` for a
/// daemon on `port`.
#[must_use]
pub fn turbo_variables(port: u16) -> Vec<(&'static str, String)> {
    vec![
        ("TURBOCACHE_PORT", port.to_string()),
        ("TURBO_API", format!("http://localhost:{port}")),
        ("TURBO_TOKEN", TURBO_CREDENTIAL.to_string()),
        ("TURBO_TEAM", TURBO_CREDENTIAL.to_string()),
    ]
}

/// Make `vars` visible to later steps.
///
/// In CI they are appended to the `$GITHUB_ENV` file; elsewhere they are
/// written to `out` as `export` lines for the user's shell.
///
/// # Errors
///
/// Fails when the environment file or `out` cannot be written.
pub fn export_variables(
    vars: &[(&str, String)],
    github_env: Option<&Path>,
    out: &mut impl Write,
) -> Result<(), CliError> {
    if let Some(path) = github_env {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                CliError::other(format!("Failed to open {}: {e}", path.display()))
            })?;
        info!("The following environment variables are exported:");
        for (name, value) in vars {
            writeln!(file, "{name}={value}").map_err(|e| {
                CliError::other(format!("Failed to write {}: {e}", path.display()))
            })?;
            info!("  {name}={value}");
        }
        return Ok(());
    }

    let write_err = |e: std::io::Error| CliError::other(format!("Failed to write output: {e}"));
    writeln!(out, "Execute:").map_err(write_err)?;
    for (name, value) in vars {
        writeln!(out, "export {name}={value}").map_err(write_err)?;
    }
    Ok(())
}
