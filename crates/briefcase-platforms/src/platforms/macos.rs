//! macOS `.app` bundles
//!
//! GUI apps log to the unified system log rather than stdout, so `run`
//! launches the bundle with `open` and follows `log stream`, using
//! [`macos_log_clean_filter`] to strip the log preamble. Builds are ad-hoc
//! signed so they can execute on Apple Silicon.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use briefcase_core::{AppConfig, BriefcaseError, Result};
use briefcase_tools::subprocess::path_arg;
use briefcase_tools::{cmd_args, SubprocessOptions, ToolId};
use regex::Regex;
use tracing::{debug, instrument};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::command::run::{app_env, stream_app_logs, StreamOptions};
use crate::command::CommandContext;
use crate::format::{Format, Phase, BASE_TOOLS};

static MACOS_LOG_PREFIX_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^\d{4}-\d{2}-\d{2} (?P<timestamp>\d{2}:\d{2}:\d{2}\.\d{3}) Df (.*?)\[.*?:.*?\]",
        r"(?P<subsystem>( \(libffi\.dylib\))|( \(_ctypes\.cpython-3\d{1,2}-.*?\.(so|dylib)\)))? (?P<content>.*)",
    ))
    .expect("Invalid regex")
});

/// Lines `log stream` prints about itself
const LOG_STREAM_NOISE: [&str; 3] = [
    "Filtering the log data using ",
    "Timestamp          ",
    "Error from getpwuid_r:",
];

/// codesign failures for files that turn out not to need a signature
const UNSIGNABLE: [&str; 2] = [
    "unsupported format for signature",
    "bundle format unrecognized, invalid, or unsuitable",
];

const MACH_O_MAGIC: [[u8; 4]; 5] = [
    [0xCA, 0xFE, 0xBA, 0xBE],
    [0xCF, 0xFA, 0xED, 0xFE],
    [0xCE, 0xFA, 0xED, 0xFE],
    [0xFE, 0xED, 0xFA, 0xCE],
    [0xFE, 0xED, 0xFA, 0xCF],
];

/// Reduce a `log stream --style compact` line to the app's own message.
///
/// The flag is true only for lines emitted through Python's stdout/stderr
/// capture, which are the lines checked for the exit sentinel.
pub fn macos_log_clean_filter(line: &str) -> Option<(String, bool)> {
    if LOG_STREAM_NOISE.iter().any(|prefix| line.starts_with(prefix)) {
        return None;
    }
    match MACOS_LOG_PREFIX_REGEX.captures(line) {
        Some(caps) => Some((caps["content"].to_string(), caps.name("subsystem").is_some())),
        None => Some((line.to_string(), false)),
    }
}

fn is_mach_o_binary(path: &Path) -> io::Result<bool> {
    let mut magic = [0u8; 4];
    match fs::File::open(path)?.read_exact(&mut magic) {
        Ok(()) => Ok(MACH_O_MAGIC.contains(&magic)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Zip `bundle` so the archive holds `<bundle name>/...`
fn zip_bundle(bundle: &Path, output: &Path) -> zip::result::ZipResult<()> {
    let root = bundle.parent().unwrap_or(bundle);
    let mut zip = ZipWriter::new(fs::File::create(output)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(bundle) {
        let entry = entry.map_err(io::Error::from)?;
        let path = entry.path();
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let name = relative.to_string_lossy().replace('\\', "/");

        #[cfg(unix)]
        let options = {
            use std::os::unix::fs::PermissionsExt;
            options.unix_permissions(entry.metadata().map_err(io::Error::from)?.permissions().mode())
        };

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{}/", name), options)?;
        } else {
            zip.start_file(name, options)?;
            zip.write_all(&fs::read(path)?)?;
        }
    }
    zip.finish()?;
    Ok(())
}

/// `macOS/app`: a double-clickable `.app` bundle
#[derive(Debug, Clone, Copy, Default)]
pub struct MacOsApp;

impl MacOsApp {
    /// The executable inside the bundle
    pub fn binary_executable_path(&self, ctx: &CommandContext, app: &AppConfig) -> PathBuf {
        self.binary_path(ctx, app)
            .join("Contents")
            .join("MacOS")
            .join(app.formal_name())
    }

    fn entitlements_path(&self, ctx: &CommandContext, app: &AppConfig) -> Option<PathBuf> {
        let paths = ctx.paths(app).ok()?;
        let relative = paths.extra.get("entitlements_path")?.as_str()?;
        Some(ctx.bundle_path(app).join(relative))
    }

    fn sign_file(&self, ctx: &CommandContext, path: &Path, entitlements: Option<&Path>) -> Result<()> {
        let mut args = cmd_args!["codesign", path_arg(path), "--sign", "-", "--force"];
        if let Some(entitlements) = entitlements {
            args.push("--entitlements".to_string());
            args.push(path_arg(entitlements));
        }
        debug!(path = %ctx.relative(path).display(), "signing");

        match ctx
            .tools
            .subprocess
            .check_output(&args, &SubprocessOptions::new().quiet())
        {
            Ok(_) => Ok(()),
            Err(BriefcaseError::Process(err))
                if err
                    .output
                    .as_deref()
                    .is_some_and(|output| UNSIGNABLE.iter().any(|msg| output.contains(msg))) =>
            {
                debug!(path = %ctx.relative(path).display(), "does not require a signature");
                Ok(())
            }
            Err(e) if e.is_interrupt() => Err(e),
            Err(_) => Err(BriefcaseError::command(format!(
                "Unable to code sign {}.",
                path.display()
            ))),
        }
    }

    /// Ad-hoc sign every binary, framework and nested app, innermost first,
    /// then the bundle itself
    pub fn sign_app(&self, ctx: &CommandContext, app: &AppConfig) -> Result<()> {
        let bundle = self.binary_path(ctx, app);
        let mut targets = Vec::new();
        for folder in [bundle.join("Contents/Resources"), bundle.join("Contents/Frameworks")] {
            for entry in WalkDir::new(&folder).min_depth(1) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) if e.io_error().is_some_and(|e| e.kind() == io::ErrorKind::NotFound) => break,
                    Err(e) => return Err(io::Error::from(e).into()),
                };
                let path = entry.path();
                let is_target = if entry.file_type().is_dir() {
                    path.extension()
                        .is_some_and(|ext| ext == "framework" || ext == "app")
                } else {
                    entry.file_type().is_file() && is_mach_o_binary(path)?
                };
                if is_target {
                    targets.push(path.to_path_buf());
                }
            }
        }
        // Reverse lexical order puts every path ahead of its parent
        targets.sort_by(|a, b| b.cmp(a));
        targets.push(bundle);

        let entitlements = self.entitlements_path(ctx, app);
        let bar = ctx.console().wait_bar("Signing App");
        for target in &targets {
            self.sign_file(ctx, target, entitlements.as_deref())?;
        }
        bar.done();
        Ok(())
    }

    /// Console apps own the terminal, so they are run directly
    fn run_console_app(&self, ctx: &CommandContext, app: &AppConfig, passthrough: &[String]) -> Result<()> {
        let options = app_env(ctx, app)?
            .cwd(&ctx.tools.home_path)
            .no_stream()
            .no_check();
        let mut args = cmd_args![path_arg(&self.binary_executable_path(ctx, app))];
        args.extend(passthrough.iter().cloned());

        ctx.console().info("=".repeat(75));
        let completed = ctx.tools.subprocess.run(&args, &options)?;
        debug!(returncode = completed.returncode, "console app exited");
        Ok(())
    }

    fn run_gui_app(&self, ctx: &CommandContext, app: &AppConfig, passthrough: &[String]) -> Result<()> {
        let subprocess = &ctx.tools.subprocess;
        let sender = path_arg(&self.binary_executable_path(ctx, app));
        let predicate = format!(
            r#"senderImagePath=="{sender}" OR (processImagePath=="{sender}" AND senderImagePath=="/usr/lib/libffi.dylib")"#
        );
        let mut log_popen = subprocess.popen(
            &cmd_args!["log", "stream", "--style", "compact", "--predicate", predicate],
            &SubprocessOptions::new(),
        )?;
        // Give the log stream a moment to attach
        thread::sleep(Duration::from_millis(250));

        let binary = path_arg(&self.binary_path(ctx, app));
        let launched = self.launch_gui_app(ctx, app, &binary, passthrough);
        let pid = match launched {
            Ok(pid) => pid,
            Err(e) => {
                subprocess.cleanup("log stream", &mut log_popen);
                return Err(e);
            }
        };

        let quiet = SubprocessOptions::new().quiet().no_stream().no_check();
        let app_exited = || {
            subprocess
                .run(&cmd_args!["kill", "-0", pid], &quiet)
                .map_or(true, |done| done.returncode != 0)
        };
        let outcome = stream_app_logs(
            ctx,
            app,
            &mut log_popen,
            StreamOptions {
                clean_filter: Some(macos_log_clean_filter),
                clean_output: true,
                stop_func: Some(&app_exited),
                log_stream: true,
            },
        );

        // The app goes down with the log stream
        if let Err(e) = subprocess.run(&cmd_args!["kill", pid], &quiet) {
            debug!(pid, error = %e, "unable to stop app");
        }
        outcome
    }

    /// Start a fresh instance of the app and find its process id
    fn launch_gui_app(&self, ctx: &CommandContext, app: &AppConfig, binary: &str, passthrough: &[String]) -> Result<u32> {
        let options = app_env(ctx, app)?.cwd(&ctx.tools.home_path);
        let mut args = cmd_args!["open", "-n", binary];
        if !passthrough.is_empty() {
            args.push("--args".to_string());
            args.extend(passthrough.iter().cloned());
        }
        ctx.tools.subprocess.run(&args, &options).map_err(|e| {
            if e.is_interrupt() {
                e
            } else {
                BriefcaseError::command(format!("Unable to start app {}.", app.app_name))
            }
        })?;

        let pid = ctx
            .tools
            .subprocess
            .check_output(&cmd_args!["pgrep", "-n", "-f", binary], &SubprocessOptions::new().quiet())
            .ok()
            .and_then(|output| output.lines().next().and_then(|line| line.trim().parse().ok()));
        pid.ok_or_else(|| {
            BriefcaseError::command(format!(
                "Unable to find process for app {} to start log streaming.",
                app.app_name
            ))
        })
    }
}

impl Format for MacOsApp {
    fn platform(&self) -> &'static str {
        "macOS"
    }

    fn output_format(&self) -> &'static str {
        "app"
    }

    fn description(&self) -> &'static str {
        "Create and populate a macOS app."
    }

    fn supported_host_os(&self) -> &'static [&'static str] {
        &["Darwin"]
    }

    fn supported_host_os_reason(&self, _host_os: &str) -> String {
        "macOS applications can only be built on macOS.".to_string()
    }

    /// The command line tools provide git on macOS
    fn tool_order(&self, _phase: Phase) -> Vec<ToolId> {
        let mut order = vec![ToolId::XcodeCli];
        order.extend_from_slice(BASE_TOOLS);
        order
    }

    fn binary_path(&self, ctx: &CommandContext, app: &AppConfig) -> PathBuf {
        ctx.bundle_path(app)
            .join(format!("{}.app", app.formal_name()))
    }

    fn distribution_path(&self, ctx: &CommandContext, app: &AppConfig) -> PathBuf {
        ctx.dist_path()
            .join(format!("{}-{}.app.zip", app.formal_name(), app.version))
    }

    #[instrument(skip_all, fields(app = %app.app_name))]
    fn build_app(&self, ctx: &CommandContext, app: &AppConfig) -> Result<()> {
        let console = ctx.console();
        console.prefixed(&app.app_name, "Building App...");
        console.prefixed(&app.app_name, "Ad-hoc signing app...");
        self.sign_app(ctx, app)
    }

    fn run_app(&self, ctx: &CommandContext, app: &AppConfig, passthrough: &[String]) -> Result<()> {
        // Test runs always stream so the exit sentinel can be seen
        if app.console_app && !app.test_mode {
            self.run_console_app(ctx, app, passthrough)
        } else {
            self.run_gui_app(ctx, app, passthrough)
        }
    }

    fn package_app(&self, ctx: &CommandContext, app: &AppConfig) -> Result<()> {
        let dist = self.distribution_path(ctx, app);
        let name = dist
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let bar = ctx.console().wait_bar(format!("Archiving {}", name));
        zip_bundle(&self.binary_path(ctx, app), &dist).map_err(|e| {
            BriefcaseError::command(format!("Unable to archive {}: {}", name, e))
        })?;
        bar.done();
        Ok(())
    }
}
