//! Briefcase - package Python projects as native applications

mod cli;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use briefcase_core::{host, BriefcaseError, Console, Verbosity};
use clap::Parser;
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use cli::Cli;

/// Target of the tracing events the console mirrors; they're already on screen
const CONSOLE_TARGET: &str = "briefcase_core::console";

fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbosity = Verbosity::from_occurrences(cli.verbose);

    let data_path = host::data_path();
    let guard = init_tracing(verbosity, data_path.as_deref());

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        tracing::warn!(error = %e, "unable to install interrupt handler");
    }

    let console = Console::new(verbosity, !cli.no_input);
    let result = match data_path {
        Some(data_path) => cli.execute(&console, data_path, interrupted.clone()),
        None => Err(BriefcaseError::config(
            "Unable to determine a data directory; set BRIEFCASE_HOME.",
        )
        .into()),
    };
    let code = match settle(result, &interrupted) {
        Ok(()) => 0,
        Err(e) => report(&console, &e),
    };

    // The file writer flushes on drop
    drop(guard);
    ExitCode::from(exit_status(code))
}

/// A command that finished after an unacknowledged Ctrl-C was still aborted
fn settle(result: anyhow::Result<()>, interrupted: &AtomicBool) -> anyhow::Result<()> {
    match result {
        Ok(()) if interrupted.load(Ordering::SeqCst) => Err(BriefcaseError::Interrupted.into()),
        other => other,
    }
}

/// Print the outcome of a failed command and choose the exit code
fn report(console: &Console, err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<BriefcaseError>() {
        Some(e) if e.is_help_text() => {
            println!("{}", e);
            e.error_code()
        }
        Some(e) => {
            if !e.skip_logfile() {
                tracing::error!(error = %e, code = e.error_code(), "command failed");
            }
            match e {
                BriefcaseError::TestSuiteFailure => {}
                BriefcaseError::Interrupted => console.warning(format!("\n{}", e)),
                _ => console.error(format!("\n{}", e)),
            }
            e.error_code()
        }
        None => {
            tracing::error!(error = ?err, "unexpected failure");
            eprintln!("{} {:?}", style("Error:").red().bold(), err);
            1
        }
    }
}

/// Negative codes wrap the way a shell reports them
fn exit_status(code: i32) -> u8 {
    code.rem_euclid(256) as u8
}

/// Set up tracing with two layers:
/// - Console: controlled by RUST_LOG (default: warn, debug with -vv)
/// - File: always debug-level JSON to `<data_path>/logs/`
fn init_tracing(verbosity: Verbosity, data_path: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if verbosity >= Verbosity::Debug {
            "debug".to_string()
        } else {
            "warn".to_string()
        }
    });
    let console_filter = EnvFilter::new(format!("{},{}=off", level, CONSOLE_TARGET));

    if let Some(log_dir) = data_path.and_then(log_directory) {
        let file_appender = tracing_appender::rolling::daily(&log_dir, "briefcase.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_filter(console_filter),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_filter(EnvFilter::new("debug")),
            )
            .init();

        return Some(guard);
    }

    // Fallback: console only
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    None
}

/// Returns the log directory path, creating it if needed.
fn log_directory(data_path: &Path) -> Option<PathBuf> {
    let log_dir = data_path.join("logs");
    std::fs::create_dir_all(&log_dir).ok()?;
    Some(log_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_wraps_negative_codes() {
        assert_eq!(exit_status(0), 0);
        assert_eq!(exit_status(1), 1);
        assert_eq!(exit_status(200), 200);
        assert_eq!(exit_status(-42), 214);
        assert_eq!(exit_status(-10), 246);
    }

    #[test]
    fn test_unacknowledged_interrupt_aborts() {
        let flag = AtomicBool::new(false);
        assert!(settle(Ok(()), &flag).is_ok());

        flag.store(true, Ordering::SeqCst);
        let err = settle(Ok(()), &flag).unwrap_err();
        let err = err.downcast_ref::<BriefcaseError>().unwrap();
        assert!(err.is_interrupt());
        assert_eq!(report(&Console::silent(), &anyhow::Error::from(BriefcaseError::Interrupted)), -42);

        // An earlier failure is still the one reported
        let err = settle(Err(BriefcaseError::command("Unable to build app first-app.").into()), &flag)
            .unwrap_err();
        assert_eq!(err.to_string(), "Unable to build app first-app.");
    }

    #[test]
    fn test_log_directory_is_created() {
        let dir = tempfile::TempDir::new().unwrap();
        let logs = log_directory(dir.path()).unwrap();
        assert!(logs.is_dir());
        assert_eq!(logs, dir.path().join("logs"));
    }
}
