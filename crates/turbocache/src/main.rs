//! turbocache CLI
//!
//! `turbocache start` (the default) launches the cache server in the
//! background and exports the Turborepo variables; `serve` runs it in the
//! foreground. `ping`, `kill` and `post` talk to a running daemon.

// CLI binary needs to output to stdout/stderr - this is intentional
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use turbocache::cli::{self, CliError, Commands, EXIT_FAILURE, EXIT_OK, exit_code_for, render_error};
use turbocache::daemon::{self, DaemonClient, DaemonState, StartOptions};
use turbocache::providers::build_provider;
use turbocache::server::{self, DaemonContext};
use turbocache::tracing::{TracingConfig, TracingFormat, init_tracing};
use turbocache_core::{LatencyTracker, Paths, SERVER_PORT, Settings};

fn main() {
    // NOTE: Using eprintln! in panic hook is intentional - tracing infrastructure
    // may be corrupted during a panic, so we use the most reliable output method.
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    // A missing .env file is the normal case
    let _ = dotenv::dotenv();

    let cli = cli::parse();
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Fatal error: Failed to create tokio runtime: {e}");
            std::process::exit(EXIT_FAILURE);
        }
    };

    let exit_code = match rt.block_on(run(cli)) {
        Ok(()) => EXIT_OK,
        Err(err) => {
            render_error(&err);
            exit_code_for(&err)
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: cli::Cli) -> Result<(), CliError> {
    let config = TracingConfig {
        format: if cli.json_logs {
            TracingFormat::Json
        } else {
            TracingFormat::Pretty
        },
        level: cli.level.into(),
        filter: None,
    };
    init_tracing(config).map_err(|e| CliError::other(e.to_string()))?;

    match cli.command() {
        Commands::Start => {
            let mut serve_args = vec!["--level".to_string(), cli.level.as_str().to_string()];
            if cli.json_logs {
                serve_args.push("--json-logs".to_string());
            }
            // Fail on bad settings here rather than in the detached process
            let settings = Settings::from_env()?;
            let options = StartOptions {
                log_file: settings.paths.log_file,
                serve_args,
                github_env: std::env::var_os("GITHUB_ENV").map(Into::into),
            };
            let client = DaemonClient::local()?;
            daemon::start(&client, &options, &mut io::stdout()).await?;
            println!("\nServer is running! You can now use Turbo with remote caching.");
            println!("\nTo stop the server, run:");
            println!("turbocache kill");
            Ok(())
        }
        Commands::Serve => serve().await,
        Commands::Ping => {
            let report = daemon::ping(&DaemonClient::local()?).await?;
            println!("Tests performed: {}", report.tests.join(", "));
            Ok(())
        }
        Commands::Kill => daemon::kill(&DaemonClient::local()?).await,
        Commands::Post => {
            let log_file = Paths::from_env().log_file;
            daemon::post(&DaemonClient::local()?, &log_file, &mut io::stdout()).await
        }
    }
}

async fn serve() -> Result<(), CliError> {
    let settings = Settings::from_env()?;
    info!(
        provider = settings.provider.as_str(),
        cache_prefix = %settings.cache_prefix,
        version = env!("CARGO_PKG_VERSION"),
        "Starting turbocache server"
    );

    let tracker = Arc::new(LatencyTracker::new());
    let provider = build_provider(&settings, Arc::clone(&tracker)).await?;
    let ctx = Arc::new(DaemonContext::new(provider, tracker, settings.retention));

    let listener = TcpListener::bind(("127.0.0.1", SERVER_PORT))
        .await
        .map_err(|e| {
            CliError::other_with_help(
                format!("Failed to bind 127.0.0.1:{SERVER_PORT}: {e}"),
                "Another daemon may already be running; stop it with `turbocache kill`",
            )
        })?;

    // Ctrl-C stops a foreground server the same way a shutdown request does
    let token = ctx.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping server");
            token.cancel();
        }
    });

    server::serve(listener, ctx)
        .await
        .map_err(|e| CliError::other(format!("Server error: {e}")))?;
    daemon::enter(DaemonState::Terminated);
    Ok(())
}
