//! Linux output formats
//!
//! AppImages are assembled by linuxdeploy, either on a Linux host or inside
//! a Docker image built from the bundle's `Dockerfile` (so they can also be
//! produced on macOS). Flatpaks are built and installed with
//! `flatpak-builder` against a runtime from a Flatpak repository.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use briefcase_core::{AppConfig, BriefcaseError, Result};
use briefcase_tools::docker::DockerImageSpec;
use briefcase_tools::flatpak::{DEFAULT_REPO_ALIAS, DEFAULT_REPO_URL};
use briefcase_tools::subprocess::path_arg;
use briefcase_tools::{
    cmd_args, AppContext, DockerAppContext, Flatpak, FlatpakAppContext, LinuxDeploy, Python,
    SubprocessOptions, Tool, ToolId,
};
use serde_json::{Map, Value};
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::command::run::{app_env, stream_app_logs, StreamOptions};
use crate::command::CommandContext;
use crate::format::{verify_tool_order, Format, Phase};

const DEFAULT_FLATPAK_RUNTIME: &str = "org.freedesktop.Platform";
const DEFAULT_FLATPAK_RUNTIME_VERSION: &str = "23.08";
const DEFAULT_FLATPAK_SDK: &str = "org.freedesktop.Sdk";

/// A list-of-strings app setting, such as `system_requires`
fn string_list(app: &AppConfig, key: &str) -> Vec<String> {
    app.extra
        .get(key)
        .and_then(|value| value.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(unix)]
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Directories holding shared libraries whose dependencies linuxdeploy
/// has to bundle
fn so_folders(appdir: &Path) -> BTreeSet<PathBuf> {
    WalkDir::new(appdir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "so")
        })
        .filter_map(|entry| entry.path().parent().map(Path::to_path_buf))
        .collect()
}

/// `linux/AppImage`: a single self-contained executable
#[derive(Debug, Clone, Copy)]
pub struct LinuxAppImage {
    use_docker: bool,
}

impl LinuxAppImage {
    pub fn new(use_docker: bool) -> Self {
        Self { use_docker }
    }

    pub fn uses_docker(&self) -> bool {
        self.use_docker
    }

    pub fn appdir_path(&self, ctx: &CommandContext, app: &AppConfig) -> PathBuf {
        ctx.bundle_path(app)
            .join(format!("{}.AppDir", app.formal_name()))
    }

    fn binary_name(&self, ctx: &CommandContext, app: &AppConfig) -> String {
        format!(
            "{}-{}-{}.AppImage",
            app.formal_name().replace(' ', "_"),
            app.version,
            ctx.tools.host_arch
        )
    }

    pub fn docker_image_tag(&self, app: &AppConfig, python_tag: &str) -> String {
        format!(
            "briefcase/{}.{}:py{}",
            app.bundle,
            app.app_name.to_lowercase(),
            python_tag
        )
    }
}

impl Format for LinuxAppImage {
    fn platform(&self) -> &'static str {
        "linux"
    }

    fn output_format(&self) -> &'static str {
        "AppImage"
    }

    fn description(&self) -> &'static str {
        "Create and populate a Linux AppImage."
    }

    fn platform_tools(&self, phase: Phase) -> Vec<ToolId> {
        let mut tools = Vec::new();
        if self.use_docker && phase != Phase::Run {
            tools.push(ToolId::Docker);
        }
        if matches!(phase, Phase::Build | Phase::Package) {
            tools.push(ToolId::LinuxDeploy);
        }
        tools
    }

    fn verify_tools(&self, ctx: &CommandContext, phase: Phase) -> Result<()> {
        let host_os = ctx.tools.host_os.as_str();
        if phase == Phase::Run {
            if host_os != "Linux" {
                return Err(BriefcaseError::command("AppImages can only be executed on Linux."));
            }
        } else if self.use_docker {
            if host_os == "Windows" {
                return Err(BriefcaseError::command(
                    "Linux AppImages cannot be generated on Windows.",
                ));
            }
        } else if host_os != "Linux" {
            return Err(BriefcaseError::command(
                "Linux AppImages can only be generated on Linux without Docker.",
            ));
        }
        verify_tool_order(ctx, &self.tool_order(phase))
    }

    fn binary_path(&self, ctx: &CommandContext, app: &AppConfig) -> PathBuf {
        ctx.platform_path(app).join(self.binary_name(ctx, app))
    }

    fn distribution_path(&self, ctx: &CommandContext, app: &AppConfig) -> PathBuf {
        ctx.dist_path().join(self.binary_name(ctx, app))
    }

    fn support_package_url(&self, ctx: &CommandContext, python_tag: &str, revision: &str) -> String {
        format!(
            "https://briefcase-support.s3.amazonaws.com/python/{tag}/linux/{arch}/Python-{tag}-linux-{arch}-support.b{revision}.tar.gz",
            tag = python_tag,
            arch = ctx.tools.host_arch,
            revision = revision,
        )
    }

    fn template_context(&self, _ctx: &CommandContext, _app: &AppConfig) -> Result<Map<String, Value>> {
        let mut context = Map::new();
        context.insert("use_docker".to_string(), Value::Bool(self.use_docker));
        Ok(context)
    }

    fn app_context(&self, ctx: &CommandContext, app: &AppConfig) -> Result<Option<Rc<dyn AppContext>>> {
        if !self.use_docker {
            return Ok(None);
        }
        let python_tag = Python::verify(&ctx.tools)?.version_tag();
        let spec = DockerImageSpec {
            app_name: app.app_name.clone(),
            image_tag: self.docker_image_tag(app, &python_tag),
            dockerfile_path: ctx.bundle_path(app).join("Dockerfile"),
            build_context: ctx.base_path.clone(),
            system_requires: string_list(app, "system_requires"),
            extra_build_args: Vec::new(),
            host_bundle_path: ctx.platform_path(app),
            host_data_path: ctx.tools.data_path.clone(),
            python_version: python_tag,
        };
        Ok(Some(Rc::new(DockerAppContext::prepare(&ctx.tools, &spec)?)))
    }

    #[instrument(skip_all, fields(app = %app.app_name, docker = self.use_docker))]
    fn build_app(&self, ctx: &CommandContext, app: &AppConfig) -> Result<()> {
        let console = ctx.console();
        let linuxdeploy = LinuxDeploy::verify(&ctx.tools)?;
        let context = ctx.app_context(app)?;

        console.prefixed(&app.app_name, "Building AppImage...");
        let bar = console.wait_bar("Building");

        let appdir = self.appdir_path(ctx, app);
        let mut args = cmd_args![
            path_arg(&linuxdeploy.file_path(&ctx.tools)),
            "--appdir",
            path_arg(&appdir),
            "--desktop-file",
            path_arg(&appdir.join(format!("{}.{}.desktop", app.bundle, app.app_name))),
            "--output",
            "appimage",
        ];
        for folder in so_folders(&appdir) {
            args.push("--deploy-deps-only".to_string());
            args.push(path_arg(&folder));
        }
        debug!(?args, "running linuxdeploy");

        // linuxdeploy takes the version from the environment, and the
        // AppImage tooling can't mount itself inside a container
        let options = SubprocessOptions::new()
            .cwd(ctx.platform_path(app))
            .env("VERSION", app.version.as_str())
            .env("DISABLE_COPYRIGHT_FILES_DEPLOYMENT", "1")
            .env("APPIMAGE_EXTRACT_AND_RUN", "1")
            .env("ARCH", ctx.tools.host_arch.as_str());
        context.run(&args, &options).map_err(|e| {
            if e.is_interrupt() {
                e
            } else {
                BriefcaseError::command(format!("Error while building app {}.", app.app_name))
            }
        })?;

        set_executable(&self.binary_path(ctx, app))?;
        bar.done();
        Ok(())
    }

    fn run_app(&self, ctx: &CommandContext, app: &AppConfig, passthrough: &[String]) -> Result<()> {
        let options = app_env(ctx, app)?.cwd(&ctx.tools.home_path);
        let mut args = cmd_args![path_arg(&self.binary_path(ctx, app))];
        args.extend(passthrough.iter().cloned());

        let mut popen = ctx.tools.subprocess.popen(&args, &options)?;
        stream_app_logs(ctx, app, &mut popen, StreamOptions::default())
    }

    /// The AppImage is already distributable; it is copied into `dist`
    fn package_app(&self, ctx: &CommandContext, app: &AppConfig) -> Result<()> {
        let binary = self.binary_path(ctx, app);
        let bar = ctx.console().wait_bar(format!("Copying {}", self.binary_name(ctx, app)));
        fs::copy(&binary, self.distribution_path(ctx, app))?;
        bar.done();
        Ok(())
    }
}

/// `linux/flatpak`: an app installed into, and distributed as, a Flatpak
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxFlatpak;

impl LinuxFlatpak {
    fn repo_alias(app: &AppConfig) -> &str {
        app.get_str("flatpak_runtime_repo_alias")
            .unwrap_or(DEFAULT_REPO_ALIAS)
    }

    fn repo_url(app: &AppConfig) -> &str {
        app.get_str("flatpak_runtime_repo_url").unwrap_or(DEFAULT_REPO_URL)
    }

    fn runtime(app: &AppConfig) -> &str {
        app.get_str("flatpak_runtime").unwrap_or(DEFAULT_FLATPAK_RUNTIME)
    }

    fn runtime_version(app: &AppConfig) -> &str {
        app.get_str("flatpak_runtime_version")
            .unwrap_or(DEFAULT_FLATPAK_RUNTIME_VERSION)
    }

    fn sdk(app: &AppConfig) -> &str {
        app.get_str("flatpak_sdk").unwrap_or(DEFAULT_FLATPAK_SDK)
    }
}

impl Format for LinuxFlatpak {
    fn platform(&self) -> &'static str {
        "linux"
    }

    fn output_format(&self) -> &'static str {
        "flatpak"
    }

    fn description(&self) -> &'static str {
        "Create and populate a Linux Flatpak."
    }

    fn supported_host_os(&self) -> &'static [&'static str] {
        &["Linux"]
    }

    fn supported_host_os_reason(&self, _host_os: &str) -> String {
        "Flatpaks can only be generated on Linux.".to_string()
    }

    fn platform_tools(&self, _phase: Phase) -> Vec<ToolId> {
        vec![ToolId::Flatpak]
    }

    /// The launcher script written by a successful build
    fn binary_path(&self, ctx: &CommandContext, app: &AppConfig) -> PathBuf {
        ctx.bundle_path(app).join(app.bundle_identifier())
    }

    fn distribution_path(&self, ctx: &CommandContext, app: &AppConfig) -> PathBuf {
        ctx.dist_path().join(format!(
            "{}-{}-{}.flatpak",
            app.formal_name().replace(' ', "_"),
            app.version,
            ctx.tools.host_arch
        ))
    }

    fn template_context(&self, _ctx: &CommandContext, app: &AppConfig) -> Result<Map<String, Value>> {
        let mut context = Map::new();
        for (key, value) in [
            ("flatpak_runtime", Self::runtime(app)),
            ("flatpak_runtime_version", Self::runtime_version(app)),
            ("flatpak_sdk", Self::sdk(app)),
        ] {
            context.insert(key.to_string(), Value::from(value));
        }
        Ok(context)
    }

    fn app_context(&self, ctx: &CommandContext, app: &AppConfig) -> Result<Option<Rc<dyn AppContext>>> {
        let context = FlatpakAppContext::new(&ctx.tools, &app.bundle_identifier(), &ctx.bundle_path(app))?;
        Ok(Some(Rc::new(context)))
    }

    #[instrument(skip_all, fields(app = %app.app_name))]
    fn build_app(&self, ctx: &CommandContext, app: &AppConfig) -> Result<()> {
        let console = ctx.console();
        let flatpak = Flatpak::verify(&ctx.tools)?;

        console.prefixed(&app.app_name, "Ensuring Flatpak runtime for the app is available...");
        flatpak.verify_repo(&ctx.tools, Self::repo_alias(app), Self::repo_url(app))?;
        flatpak.verify_runtime(
            &ctx.tools,
            Self::repo_alias(app),
            Self::runtime(app),
            Self::runtime_version(app),
            Self::sdk(app),
        )?;

        console.prefixed(&app.app_name, "Building Flatpak...");
        let bar = console.wait_bar("Building");
        flatpak.build(
            &ctx.tools,
            &app.bundle_identifier(),
            &app.app_name,
            &ctx.bundle_path(app),
        )?;
        bar.done();
        Ok(())
    }

    fn run_app(&self, ctx: &CommandContext, app: &AppConfig, passthrough: &[String]) -> Result<()> {
        // flatpak run sets up the sandbox environment itself
        app_env(ctx, app)?;
        let flatpak = Flatpak::verify(&ctx.tools)?;
        let main_module = app.test_mode.then(|| app.main_module());
        let mut popen = flatpak.run(
            &ctx.tools,
            &app.bundle_identifier(),
            passthrough,
            main_module.as_deref(),
        )?;
        stream_app_logs(ctx, app, &mut popen, StreamOptions::default())
    }

    fn package_app(&self, ctx: &CommandContext, app: &AppConfig) -> Result<()> {
        let flatpak = Flatpak::verify(&ctx.tools)?;
        ctx.console()
            .prefixed(&app.app_name, "Building Flatpak bundle...");
        let bar = ctx.console().wait_bar("Building bundle");
        flatpak.bundle(
            &ctx.tools,
            Self::repo_url(app),
            &app.bundle_identifier(),
            &app.app_name,
            &app.version,
            &ctx.bundle_path(app),
            &self.distribution_path(ctx, app),
        )?;
        bar.done();
        Ok(())
    }
}
