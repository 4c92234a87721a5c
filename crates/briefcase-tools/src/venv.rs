//! Virtual environments
//!
//! An app either runs against the host interpreter ([`NoOpEnvironment`]) or
//! inside an isolated environment at `<project>/.briefcase/<app>/venv`
//! ([`VenvEnvironment`]). [`virtual_environment`] picks one; entering it
//! creates the environment when needed and hands back the [`AppContext`]
//! commands should run through.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use briefcase_core::{BriefcaseError, Result};
use tracing::{debug, info};

use crate::cache::ToolCache;
use crate::cmd_args;
use crate::context::{AppContext, NativeAppContext};
use crate::subprocess::{path_arg, CompletedProcess, Popen, Subprocess, SubprocessOptions};

/// Marker file whose presence means a venv was fully created
pub const PYVENV_CFG: &str = "pyvenv.cfg";

/// Location of the isolated environment for `app_name` in a project
pub fn venv_path(base_path: &Path, app_name: &str) -> PathBuf {
    base_path.join(".briefcase").join(app_name).join("venv")
}

/// A Python virtual environment on disk, and the context for running
/// commands inside it
#[derive(Debug, Clone)]
pub struct VenvContext {
    subprocess: Subprocess,
    app_name: String,
    host_os: String,
    host_python: PathBuf,
    venv_path: PathBuf,
}

impl VenvContext {
    pub fn new(tools: &ToolCache, app_name: &str, venv_path: impl Into<PathBuf>) -> Self {
        Self {
            subprocess: tools.subprocess.clone(),
            app_name: app_name.to_string(),
            host_os: tools.host_os.clone(),
            host_python: tools.host_python.clone(),
            venv_path: venv_path.into(),
        }
    }

    pub fn venv_path(&self) -> &Path {
        &self.venv_path
    }

    fn is_windows(&self) -> bool {
        self.host_os == "Windows"
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.venv_path
            .join(if self.is_windows() { "Scripts" } else { "bin" })
    }

    /// The venv's own interpreter
    pub fn executable(&self) -> PathBuf {
        self.bin_dir()
            .join(if self.is_windows() { "python.exe" } else { "python" })
    }

    /// A venv exists only once both its directory and `pyvenv.cfg` are present
    pub fn exists(&self) -> bool {
        self.venv_path.is_dir() && self.venv_path.join(PYVENV_CFG).is_file()
    }

    pub fn create(&self) -> Result<()> {
        if let Some(parent) = self.venv_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bar = self.subprocess.console().wait_bar(format!(
            "Creating virtual environment at {}",
            self.venv_path.display()
        ));
        let args = cmd_args![path_arg(&self.host_python), "-m", "venv", path_arg(&self.venv_path)];
        self.subprocess
            .run(&args, &SubprocessOptions::new().no_stream())
            .map_err(|e| match e {
                BriefcaseError::Interrupted => e,
                e => {
                    debug!(error = %e, "venv creation failed");
                    BriefcaseError::command(format!(
                        "Failed to create virtual environment for {} at {}",
                        self.app_name,
                        self.venv_path.display()
                    ))
                }
            })?;
        bar.done();
        info!(venv = %self.venv_path.display(), "virtual environment created");
        self.update_core_tools()
    }

    /// Bring the venv's installer tooling up to date
    pub fn update_core_tools(&self) -> Result<()> {
        let bar = self
            .subprocess
            .console()
            .wait_bar("Upgrading pip tooling in virtual environment");
        let args = cmd_args![
            path_arg(&self.executable()),
            "-m",
            "pip",
            "install",
            "-U",
            "pip",
            "setuptools",
            "wheel"
        ];
        let options = self.venv_options(&SubprocessOptions::new().no_stream());
        self.subprocess.run(&args, &options).map_err(|e| match e {
            BriefcaseError::Interrupted => e,
            e => {
                debug!(error = %e, "pip bootstrap failed");
                BriefcaseError::command(format!(
                    "Virtual environment created, but failed to bootstrap pip tooling for {}",
                    self.app_name
                ))
            }
        })?;
        bar.done();
        Ok(())
    }

    /// Remove an existing venv, then create a fresh one
    pub fn recreate(&self) -> Result<()> {
        if self.exists() {
            self.subprocess
                .console()
                .info("Recreating virtual environment...");
            std::fs::remove_dir_all(&self.venv_path)?;
        }
        self.create()
    }

    /// Swap a leading host interpreter for the venv interpreter
    pub fn rewrite_head(&self, args: &[String]) -> Vec<String> {
        let mut args = args.to_vec();
        let host_python = path_arg(&self.host_python);
        let is_host_python = args.first().is_some_and(|head| {
            if self.is_windows() {
                head.eq_ignore_ascii_case(&host_python)
            } else {
                *head == host_python
            }
        });
        if is_host_python {
            args[0] = path_arg(&self.executable());
        }
        args
    }

    /// `options` with the venv's environment applied beneath the caller's
    /// own overrides
    pub fn venv_options(&self, options: &SubprocessOptions) -> SubprocessOptions {
        let separator = if self.is_windows() { ";" } else { ":" };
        let path = match self.subprocess.env_var("PATH") {
            Some(path) if !path.is_empty() => {
                format!("{}{}{}", path_arg(&self.bin_dir()), separator, path)
            }
            _ => path_arg(&self.bin_dir()),
        };

        let mut venv = options.clone();
        venv.env.clear();
        venv.env
            .insert("VIRTUAL_ENV".to_string(), Some(path_arg(&self.venv_path)));
        venv.env.insert("PATH".to_string(), Some(path));
        venv.env.insert("PYTHONHOME".to_string(), None);
        venv.env.insert(
            "PIP_DISABLE_PIP_VERSION_CHECK".to_string(),
            Some("1".to_string()),
        );
        venv.env
            .extend(options.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        venv
    }
}

impl AppContext for VenvContext {
    fn run(&self, args: &[String], options: &SubprocessOptions) -> Result<CompletedProcess> {
        self.subprocess
            .run(&self.rewrite_head(args), &self.venv_options(options))
    }

    fn check_output(&self, args: &[String], options: &SubprocessOptions) -> Result<String> {
        self.subprocess
            .check_output(&self.rewrite_head(args), &self.venv_options(options))
    }

    fn popen(&self, args: &[String], options: &SubprocessOptions) -> Result<Popen> {
        self.subprocess
            .popen(&self.rewrite_head(args), &self.venv_options(options))
    }

    fn subprocess(&self) -> &Subprocess {
        &self.subprocess
    }
}

/// Runs commands with the host interpreter; there is nothing to create
#[derive(Debug, Clone)]
pub struct NoOpVenvContext {
    native: NativeAppContext,
    host_python: PathBuf,
}

impl NoOpVenvContext {
    pub fn new(tools: &ToolCache) -> Self {
        Self {
            native: NativeAppContext::new(tools.subprocess.clone()),
            host_python: tools.host_python.clone(),
        }
    }

    pub fn exists(&self) -> bool {
        true
    }

    pub fn executable(&self) -> &Path {
        &self.host_python
    }
}

impl AppContext for NoOpVenvContext {
    fn run(&self, args: &[String], options: &SubprocessOptions) -> Result<CompletedProcess> {
        self.native.run(args, options)
    }

    fn check_output(&self, args: &[String], options: &SubprocessOptions) -> Result<String> {
        self.native.check_output(args, options)
    }

    fn popen(&self, args: &[String], options: &SubprocessOptions) -> Result<Popen> {
        self.native.popen(args, options)
    }

    fn subprocess(&self) -> &Subprocess {
        self.native.subprocess()
    }
}

/// An isolated environment, created on entry if it is missing
#[derive(Debug)]
pub struct VenvEnvironment {
    pub context: VenvContext,
    pub recreate: bool,
}

impl VenvEnvironment {
    pub fn enter(self) -> Result<Rc<dyn AppContext>> {
        if self.recreate {
            self.context.recreate()?;
        } else if !self.context.exists() {
            self.context.create()?;
        } else {
            debug!(venv = %self.context.venv_path.display(), "reusing virtual environment");
        }
        Ok(Rc::new(self.context))
    }
}

/// Pass-through to the host interpreter
#[derive(Debug)]
pub struct NoOpEnvironment {
    pub context: NoOpVenvContext,
}

impl NoOpEnvironment {
    pub fn enter(self) -> Result<Rc<dyn AppContext>> {
        Ok(Rc::new(self.context))
    }
}

#[derive(Debug)]
pub enum VirtualEnvironment {
    Venv(VenvEnvironment),
    NoOp(NoOpEnvironment),
}

impl VirtualEnvironment {
    /// Prepare the environment and return the context to run commands in
    pub fn enter(self) -> Result<Rc<dyn AppContext>> {
        match self {
            Self::Venv(env) => env.enter(),
            Self::NoOp(env) => env.enter(),
        }
    }

    pub fn is_isolated(&self) -> bool {
        matches!(self, Self::Venv(_))
    }

    /// Interpreter commands should start with; execution contexts rewrite it
    /// to their own where needed
    pub fn python(&self) -> PathBuf {
        match self {
            Self::Venv(env) => env.context.executable(),
            Self::NoOp(env) => env.context.executable().to_path_buf(),
        }
    }
}

/// Choose the environment an app's commands run in. `recreate` only applies
/// to isolated environments.
pub fn virtual_environment(
    tools: &ToolCache,
    app_name: &str,
    base_path: &Path,
    isolated: bool,
    recreate: bool,
) -> VirtualEnvironment {
    if isolated {
        VirtualEnvironment::Venv(VenvEnvironment {
            context: VenvContext::new(tools, app_name, venv_path(base_path, app_name)),
            recreate,
        })
    } else {
        VirtualEnvironment::NoOp(NoOpEnvironment {
            context: NoOpVenvContext::new(tools),
        })
    }
}

/// Install `requires` into whatever environment `context` runs in
pub fn pip_install(
    context: &dyn AppContext,
    python: &Path,
    requires: &[String],
    extra_args: &[String],
    message: &str,
) -> Result<()> {
    let console = context.subprocess().console().clone();
    if requires.is_empty() {
        console.info("No requirements");
        return Ok(());
    }
    let mut args = cmd_args![path_arg(python), "-u", "-X", "utf8", "-m", "pip", "install", "--upgrade"];
    if console.is_verbose() {
        args.push("-vv".to_string());
    }
    args.extend(extra_args.iter().cloned());
    args.extend(requires.iter().cloned());

    let bar = console.wait_bar(message);
    context
        .run(&args, &SubprocessOptions::new())
        .map_err(|e| match e {
            BriefcaseError::Interrupted => e,
            e => BriefcaseError::dependency_install("", Some(Box::new(e))),
        })?;
    bar.done();
    Ok(())
}
