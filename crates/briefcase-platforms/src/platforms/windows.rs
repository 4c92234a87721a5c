//! Windows apps, packaged as an MSI installer with WiX or as a plain zip

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use briefcase_core::{AppConfig, BriefcaseError, Result};
use briefcase_tools::subprocess::path_arg;
use briefcase_tools::{cmd_args, SubprocessOptions, Tool, ToolId, WiX};
use serde_json::{Map, Value};
use tracing::{debug, instrument};
use uuid::Uuid;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::command::run::{app_env, stream_app_logs, StreamOptions};
use crate::command::CommandContext;
use crate::format::{Format, Phase};

/// Directory inside the bundle holding the app and its runtime
const PACKAGING_ROOT: &str = "src";

/// WiX wants a purely numeric `major.minor.micro` version
pub fn version_triple(version: &str) -> String {
    let release = version.split_once('!').map_or(version, |(_, rest)| rest);
    let numeric: String = release
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let mut parts: Vec<String> = numeric
        .split('.')
        .filter(|part| !part.is_empty())
        .map(|part| part.trim_start_matches('0'))
        .map(|part| if part.is_empty() { "0" } else { part }.to_string())
        .collect();
    parts.resize(3, "0".to_string());
    parts.truncate(3);
    parts.join(".")
}

/// Stable installer GUID derived from the bundle identifier, read as a DNS name
pub fn default_guid(app: &AppConfig) -> Uuid {
    let domain: Vec<String> = app
        .bundle_identifier()
        .split('.')
        .rev()
        .map(str::to_string)
        .collect();
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, domain.join(".").as_bytes())
}

fn uses_zip(app: &AppConfig) -> bool {
    app.get_str("packaging_format") == Some("zip")
}

/// `windows/app`: a stub executable plus an embedded Python
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsApp;

impl WindowsApp {
    fn packaging_root(&self, ctx: &CommandContext, app: &AppConfig) -> PathBuf {
        ctx.bundle_path(app).join(PACKAGING_ROOT)
    }

    fn unbuilt_executable_path(&self, ctx: &CommandContext, app: &AppConfig) -> PathBuf {
        self.packaging_root(ctx, app).join("Stub.exe")
    }

    fn wix_step(
        &self,
        ctx: &CommandContext,
        app: &AppConfig,
        label: &str,
        args: &[String],
        failure: String,
    ) -> Result<()> {
        ctx.console().info(format!("{}...", label));
        let bar = ctx
            .console()
            .wait_bar(label.split_whitespace().next().unwrap_or(label));
        let options = SubprocessOptions::new().cwd(ctx.bundle_path(app));
        ctx.tools.subprocess.run(args, &options).map_err(|e| {
            if e.is_interrupt() {
                e
            } else {
                debug!(error = %e, "WiX step failed");
                BriefcaseError::command(failure)
            }
        })?;
        bar.done();
        Ok(())
    }

    #[instrument(skip_all, fields(app = %app.app_name))]
    fn package_msi(&self, ctx: &CommandContext, app: &AppConfig) -> Result<()> {
        let wix = WiX::verify(&ctx.tools)?;
        let module = app.module_name();
        ctx.console().prefixed(&app.app_name, "Building MSI...");

        self.wix_step(
            ctx,
            app,
            "Compiling application manifest",
            &cmd_args![
                path_arg(&wix.heat_exe()),
                "dir",
                PACKAGING_ROOT,
                "-nologo",
                "-gg",
                "-sfrag",
                "-sreg",
                "-srd",
                "-scom",
                "-dr",
                format!("{}_ROOTDIR", module),
                "-cg",
                format!("{}_COMPONENTS", module),
                "-var",
                "var.SourceDir",
                "-out",
                format!("{}-manifest.wxs", app.app_name),
            ],
            format!("Unable to generate manifest for app {}.", app.app_name),
        )?;

        self.wix_step(
            ctx,
            app,
            "Compiling application installer",
            &cmd_args![
                path_arg(&wix.candle_exe()),
                "-nologo",
                "-ext",
                "WixUtilExtension",
                "-ext",
                "WixUIExtension",
                "-arch",
                "x64",
                format!("-dSourceDir={}", PACKAGING_ROOT),
                format!("{}.wxs", app.app_name),
                format!("{}-manifest.wxs", app.app_name),
            ],
            format!("Unable to compile app {}.", app.app_name),
        )?;

        self.wix_step(
            ctx,
            app,
            "Linking application installer",
            &cmd_args![
                path_arg(&wix.light_exe()),
                "-nologo",
                "-ext",
                "WixUtilExtension",
                "-ext",
                "WixUIExtension",
                "-loc",
                "unicode.wxl",
                "-o",
                path_arg(&self.distribution_path(ctx, app)),
                format!("{}.wixobj", app.app_name),
                format!("{}-manifest.wixobj", app.app_name),
            ],
            format!("Unable to link app {}.", app.app_name),
        )
    }

    fn package_zip(&self, ctx: &CommandContext, app: &AppConfig) -> Result<()> {
        ctx.console().prefixed(&app.app_name, "Building zip file...");
        let bar = ctx.console().wait_bar("Packing");
        let root = format!("{}-{}", app.formal_name(), app.version);
        let output = self.distribution_path(ctx, app);
        zip_tree(&self.packaging_root(ctx, app), &root, &output).map_err(|e| {
            BriefcaseError::command(format!("Unable to archive {}: {}", output.display(), e))
        })?;
        bar.done();
        Ok(())
    }
}

/// Zip every file under `source`, nested inside `root` in the archive
fn zip_tree(source: &Path, root: &str, output: &Path) -> io::Result<()> {
    let mut zip = ZipWriter::new(fs::File::create(output)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let name = format!("{}/{}", root, relative.to_string_lossy().replace('\\', "/"));
        if entry.file_type().is_dir() {
            zip.add_directory(name, options)?;
        } else {
            zip.start_file(name, options)?;
            zip.write_all(&fs::read(entry.path())?)?;
        }
    }
    zip.finish()?;
    Ok(())
}

impl Format for WindowsApp {
    fn platform(&self) -> &'static str {
        "windows"
    }

    fn output_format(&self) -> &'static str {
        "app"
    }

    fn description(&self) -> &'static str {
        "Create and populate a Windows app."
    }

    fn supported_host_os(&self) -> &'static [&'static str] {
        &["Windows"]
    }

    fn supported_host_os_reason(&self, _host_os: &str) -> String {
        "Windows applications can only be built on Windows.".to_string()
    }

    fn platform_tools(&self, phase: Phase) -> Vec<ToolId> {
        match phase {
            Phase::Package => vec![ToolId::Wix],
            _ => Vec::new(),
        }
    }

    fn binary_path(&self, ctx: &CommandContext, app: &AppConfig) -> PathBuf {
        self.packaging_root(ctx, app)
            .join(format!("{}.exe", app.formal_name()))
    }

    fn distribution_path(&self, ctx: &CommandContext, app: &AppConfig) -> PathBuf {
        let suffix = if uses_zip(app) { "zip" } else { "msi" };
        ctx.dist_path()
            .join(format!("{}-{}.{}", app.formal_name(), app.version, suffix))
    }

    fn support_package_url(&self, _ctx: &CommandContext, python_tag: &str, revision: &str) -> String {
        format!(
            "https://www.python.org/ftp/python/{tag}.{rev}/python-{tag}.{rev}-embed-amd64.zip",
            tag = python_tag,
            rev = revision
        )
    }

    fn template_context(&self, ctx: &CommandContext, app: &AppConfig) -> Result<Map<String, Value>> {
        let version_triple = app
            .get_str("version_triple")
            .map(str::to_string)
            .unwrap_or_else(|| version_triple(&app.version));

        let guid = match app.get_str("guid") {
            Some(guid) => guid.to_string(),
            None => {
                let guid = default_guid(app);
                ctx.console().info(format!(
                    "Assigning {} an application GUID of {}",
                    app.app_name, guid
                ));
                guid.to_string()
            }
        };

        // Without a preference the installer asks the user
        let install_scope = match app.get_bool("system_installer") {
            Some(true) => Value::from("perMachine"),
            Some(false) => Value::from("perUser"),
            None => Value::Null,
        };

        let mut context = Map::new();
        context.insert("version_triple".to_string(), Value::from(version_triple));
        context.insert("guid".to_string(), Value::from(guid));
        context.insert("install_scope".to_string(), install_scope);
        Ok(context)
    }

    fn build_app(&self, ctx: &CommandContext, app: &AppConfig) -> Result<()> {
        ctx.console().prefixed(&app.app_name, "Building App...");

        let stub = self.unbuilt_executable_path(ctx, app);
        if stub.exists() {
            let bar = ctx.console().wait_bar("Renaming stub binary");
            fs::rename(&stub, self.binary_path(ctx, app))?;
            bar.done();
        }
        Ok(())
    }

    fn run_app(&self, ctx: &CommandContext, app: &AppConfig, passthrough: &[String]) -> Result<()> {
        let options = app_env(ctx, app)?.cwd(&ctx.tools.home_path);
        let mut args = cmd_args![path_arg(&self.binary_path(ctx, app))];
        args.extend(passthrough.iter().cloned());

        let mut popen = ctx.tools.subprocess.popen(&args, &options)?;
        stream_app_logs(ctx, app, &mut popen, StreamOptions::default())
    }

    fn package_app(&self, ctx: &CommandContext, app: &AppConfig) -> Result<()> {
        if uses_zip(app) {
            self.package_zip(ctx, app)
        } else {
            self.package_msi(ctx, app)
        }
    }
}
