//! Spawning the detached server process and reading its log.

use crate::cli::CliError;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

/// Truncate `log_file` and start `current_exe serve <serve_args>` in the
/// background with stdout and stderr appended to it.
///
/// On Unix the child gets its own process group so it outlives the
/// launcher's session. Returns the child's PID when known.
///
/// # Errors
///
/// Fails when the log file cannot be prepared or the process cannot be
/// spawned.
pub fn launch(log_file: &Path, serve_args: &[String]) -> Result<Option<u32>, CliError> {
    let io_err = |what: &str, e: io::Error| CliError::other(format!("{what}: {e}"));

    if let Some(parent) = log_file.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| io_err(&format!("Failed to create {}", parent.display()), e))?;
    }
    std::fs::File::create(log_file)
        .map_err(|e| io_err(&format!("Failed to truncate {}", log_file.display()), e))?;
    let stdout = OpenOptions::new()
        .append(true)
        .open(log_file)
        .map_err(|e| io_err(&format!("Failed to open {}", log_file.display()), e))?;
    let stderr = stdout
        .try_clone()
        .map_err(|e| io_err("Failed to duplicate log handle", e))?;

    let exe = std::env::current_exe()
        .map_err(|e| io_err("Failed to locate the turbocache executable", e))?;
    let mut command = Command::new(&exe);
    command
        .arg("serve")
        .args(serve_args)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr);
    #[cfg(unix)]
    command.process_group(0);

    let child = command
        .spawn()
        .map_err(|e| io_err("Failed to start the daemon", e))?;
    let pid = child.id();
    info!(pid, log_file = %log_file.display(), "Launched daemon process");
    Ok(pid)
}

/// Contents of the daemon log; a missing file reads as empty.
///
/// # Errors
///
/// Fails on any read error other than the file not existing.
pub async fn read_log(log_file: &Path) -> Result<String, CliError> {
    match tokio::fs::read(log_file).await {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(CliError::other(format!(
            "Failed to read {}: {e}",
            log_file.display()
        ))),
    }
}
