//! The run phase, plus the helpers formats use to launch an app and watch
//! its output for the exit sentinel.

use briefcase_core::{AppConfig, BriefcaseError, Result};
use briefcase_tools::{Popen, SubprocessOptions};
use tracing::{debug, instrument};

use super::build::{BuildCommand, BuildOptions};
use super::CommandContext;
use crate::debuggers::{debugger_env, DEBUGGER_ENV};
use crate::format::Phase;
use crate::log_filter::{CleanFilter, ExitFilter, LogFilter};

/// Options for `briefcase run`
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub build: BuildOptions,
    /// Arguments passed through to the app
    pub passthrough: Vec<String>,
}

/// How an app's output should be watched
#[derive(Default)]
pub struct StreamOptions<'a> {
    pub clean_filter: Option<CleanFilter>,
    /// Show cleaned lines rather than raw ones
    pub clean_output: bool,
    /// Stop watching once this returns true
    pub stop_func: Option<&'a dyn Fn() -> bool>,
    /// The stream is a system log rather than the app's own output, so the
    /// process exit status says nothing about the app
    pub log_stream: bool,
}

pub struct RunCommand<'a> {
    ctx: &'a CommandContext,
    options: RunOptions,
}

impl<'a> RunCommand<'a> {
    pub fn new(ctx: &'a CommandContext, options: RunOptions) -> Self {
        Self { ctx, options }
    }

    /// Build `app` if it is missing or stale, then start it
    #[instrument(skip_all, fields(app = %app.app_name))]
    pub fn run(&self, app: &AppConfig) -> Result<()> {
        let ctx = self.ctx;
        let build = self.options.build;
        build.validate()?;
        ctx.prepare(Phase::Run)?;

        let needs_build = !ctx.bundle_path(app).exists()
            || build.wants_update(app)
            || app.debugger.is_some()
            || !ctx.binary_path(app).exists();
        if needs_build {
            debug!("building before run");
            if ctx.format.supports_phase(Phase::Build) {
                ctx.format.verify_tools(ctx, Phase::Build)?;
            }
            BuildCommand::new(ctx, build).build_app(app)?;
        }

        ctx.format.verify_app(ctx, app)?;
        ctx.format.run_app(ctx, app, &self.options.passthrough)
    }
}

/// Environment for launching `app`: the test-suite entry point in test mode,
/// and the remote debugger settings when one is configured
pub fn app_env(ctx: &CommandContext, app: &AppConfig) -> Result<SubprocessOptions> {
    let console = ctx.console();
    let mut options = SubprocessOptions::new();
    if app.test_mode {
        console.prefixed(&app.app_name, "Starting test_suite...");
        options = options.env("BRIEFCASE_MAIN_MODULE", app.main_module());
    } else {
        console.prefixed(&app.app_name, "Starting app...");
    }
    if let Some(debugger) = &app.debugger {
        options = options.env(DEBUGGER_ENV, debugger_env(debugger)?);
    }
    Ok(options)
}

/// Print the app's output until it exits or announces its exit, then turn
/// the result into an outcome.
///
/// In test mode the announced return code decides whether the suite
/// passed. Otherwise a non-zero code is an error: the announced code for a
/// log stream, the process status for the app's own output. Interrupting
/// the stream stops the app and ends the run normally; the interrupt is
/// acknowledged so the app can still be torn down afterwards.
pub fn stream_app_logs(
    ctx: &CommandContext,
    app: &AppConfig,
    popen: &mut Popen,
    options: StreamOptions<'_>,
) -> Result<()> {
    let console = ctx.console();
    let mut log_filter = LogFilter::new(ExitFilter::for_pattern(app.exit_regex.as_deref())?);
    if let Some(clean_filter) = options.clean_filter {
        log_filter = log_filter.with_clean_filter(clean_filter, options.clean_output);
    }

    console.info("=".repeat(75));
    let label = if options.log_stream {
        "log stream"
    } else {
        app.app_name.as_str()
    };
    match ctx
        .tools
        .subprocess
        .stream_output(label, popen, options.stop_func, Some(&mut log_filter))
    {
        Ok(()) => {}
        Err(BriefcaseError::Interrupted) => {
            ctx.tools.subprocess.acknowledge_interrupt();
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    let returncode = log_filter.returncode();
    debug!(?returncode, process = ?popen.returncode(), "app output finished");
    if app.test_mode {
        match returncode {
            Some(0) => {
                console.prefixed(&app.app_name, "Test suite passed!");
                Ok(())
            }
            None => Err(BriefcaseError::command("Test suite didn't report a result.")),
            Some(_) => {
                console.error(format!("[{}] Test suite failed!", app.app_name));
                Err(BriefcaseError::TestSuiteFailure)
            }
        }
    } else if options.log_stream {
        match returncode {
            Some(code) if code != 0 => Err(problem_running(app)),
            _ => Ok(()),
        }
    } else if popen.returncode() != Some(0) {
        Err(problem_running(app))
    } else {
        Ok(())
    }
}

fn problem_running(app: &AppConfig) -> BriefcaseError {
    BriefcaseError::command(format!("Problem running app {}.", app.app_name))
}
