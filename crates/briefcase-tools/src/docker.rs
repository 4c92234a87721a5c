//! Docker, and the Docker execution context

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use briefcase_core::{BriefcaseError, Result};
use tracing::{debug, info};

use crate::cache::ToolCache;
use crate::cmd_args;
use crate::context::AppContext;
use crate::subprocess::{path_arg, CompletedProcess, Popen, Subprocess, SubprocessOptions};
use crate::tool::{parse_loose_version, Tool, VerifyOptions};

const DOCKER_VERSION_MIN: &str = "20.10";

const UNKNOWN_VERSION_WARNING: &str = "
*************************************************************************
** WARNING: Unable to determine the version of Docker                  **
*************************************************************************

    Briefcase will proceed, assuming everything is OK. If you
    experience problems, this is almost certainly the cause of those
    problems.

    Please report this as a bug at:

      https://github.com/beeware/briefcase/issues/new

    In your report, please including the output from running:

      $ docker --version

    from the command prompt.

*************************************************************************
";

const INSTALL_STATUS_UNKNOWN_WARNING: &str = "
*************************************************************************
** WARNING: Unable to determine if Docker is installed                 **
*************************************************************************

    Briefcase will proceed, assuming everything is OK. If you
    experience problems, this is almost certainly the cause of those
    problems.

*************************************************************************
";

const LACKS_PERMISSION_ERROR: &str = "\
Docker has been installed, but Briefcase is unable to invoke
Docker commands. It is possible that your user does not have
permissions to invoke Docker.

See https://docs.docker.com/engine/install/linux-postinstall/
for details on configuring access to your Docker installation.";

const DAEMON_NOT_RUNNING_ERROR: &str = "\
Briefcase is unable to use Docker commands. It appears the Docker
daemon is not running.

See https://docs.docker.com/config/daemon/ for details on how to
configure your Docker daemon.";

const GENERIC_DOCKER_ERROR: &str = "\
Briefcase was unable to use Docker commands. Check your Docker
installation, and try again.";

const BUILDX_PLUGIN_MISSING: &str = "\
Docker is installed and available for use but the buildx plugin
is not installed. Briefcase leverages the BuildKit Docker backend
to build Docker images and the buildx plugin makes this available.

See https://docs.docker.com/go/buildx/ to install the buildx plugin.";

fn install_url(host_os: &str) -> &'static str {
    match host_os {
        "Windows" => "https://docs.docker.com/docker-for-windows/install/",
        "Darwin" => "https://docs.docker.com/docker-for-mac/install/",
        _ => "https://docs.docker.com/engine/install/#server",
    }
}

/// Extract the version from `Docker version 25.0.2, build 29cf629`
fn parse_docker_version(output: &str) -> Option<&str> {
    let rest = output.split("Docker version ").nth(1)?;
    let version = rest.split(',').next()?;
    version.split('-').next()
}

/// Arguments for a one-off `docker run`
#[derive(Debug, Clone, Default)]
pub struct DockerRun<'a> {
    pub image_tag: &'a str,
    /// Attach stdin and allocate a tty
    pub interactive: bool,
    /// Bind mounts, as (host, container) pairs
    pub mounts: Vec<(String, String)>,
    /// Host path prefixes rewritten to container paths in every argument
    pub path_map: Vec<(String, String)>,
    /// Environment for the command inside the container
    pub env: BTreeMap<String, String>,
    /// Variables removed from the image's environment before the command runs
    pub unset_env: Vec<String>,
    pub cwd: Option<String>,
}

/// The user's Docker install
#[derive(Debug)]
pub struct Docker {
    cached_images: RefCell<HashSet<String>>,
}

impl Tool for Docker {
    const NAME: &'static str = "docker";
    const FULL_NAME: &'static str = "Docker";

    fn verify_install(tools: &ToolCache, _options: VerifyOptions) -> Result<Self> {
        Self::version_compat(tools)?;
        Self::user_access(tools)?;
        Self::buildx_installed(tools)?;
        Ok(Self {
            cached_images: RefCell::new(HashSet::new()),
        })
    }
}

impl Docker {
    /// Options for invoking the docker CLI itself
    pub fn subprocess_options() -> SubprocessOptions {
        SubprocessOptions::new().env("DOCKER_CLI_HINTS", "false")
    }

    fn version_compat(tools: &ToolCache) -> Result<()> {
        let output = tools
            .subprocess
            .check_output(&cmd_args!["docker", "--version"], &Self::subprocess_options());
        let output = match output {
            Ok(output) => output,
            Err(BriefcaseError::Process(_)) => {
                tools.console.warning(INSTALL_STATUS_UNKNOWN_WARNING);
                return Ok(());
            }
            Err(BriefcaseError::Io(e)) => {
                debug!(error = %e, "docker is not available");
                return Err(BriefcaseError::command(format!(
                    "Briefcase requires Docker, but it is not installed (or is not on your PATH).\n\
                     Visit:\n\n    {}\n\n\
                     to download and install Docker manually.\n\n\
                     If you have installed Docker recently and are still getting this error, you may\n\
                     need to restart your terminal session.",
                    install_url(&tools.host_os)
                )));
            }
            Err(e) => return Err(e),
        };

        let version = parse_docker_version(&output);
        match version.and_then(parse_loose_version) {
            Some(found) => {
                let minimum = parse_loose_version(DOCKER_VERSION_MIN).unwrap_or(semver::Version::new(20, 10, 0));
                if found < minimum {
                    return Err(BriefcaseError::command(format!(
                        "Briefcase requires Docker {} or higher, but you are currently running\n\
                         version {}. Visit:\n\n    {}\n\n\
                         to download and install an updated version of Docker.",
                        DOCKER_VERSION_MIN,
                        version.unwrap_or_default(),
                        install_url(&tools.host_os)
                    )));
                }
                debug!(version = %found, "docker version is compatible");
            }
            None => tools.console.warning(UNKNOWN_VERSION_WARNING),
        }
        Ok(())
    }

    fn user_access(tools: &ToolCache) -> Result<()> {
        match tools
            .subprocess
            .check_output(&cmd_args!["docker", "info"], &Self::subprocess_options())
        {
            Ok(_) => Ok(()),
            Err(BriefcaseError::Process(err)) => {
                let output = err.output.unwrap_or_default();
                let message = if output.contains("permission denied while trying to connect") {
                    LACKS_PERMISSION_ERROR
                } else if output.contains("Is the docker daemon running?")
                    || output.contains("connect: connection refused")
                {
                    DAEMON_NOT_RUNNING_ERROR
                } else {
                    GENERIC_DOCKER_ERROR
                };
                Err(BriefcaseError::command(message))
            }
            Err(e) => Err(e),
        }
    }

    fn buildx_installed(tools: &ToolCache) -> Result<()> {
        match tools.subprocess.check_output(
            &cmd_args!["docker", "buildx", "version"],
            &Self::subprocess_options(),
        ) {
            Ok(_) => Ok(()),
            Err(BriefcaseError::Process(_)) => Err(BriefcaseError::command(BUILDX_PLUGIN_MISSING)),
            Err(e) => Err(e),
        }
    }

    /// Pull `image_tag` unless it is already in the local image cache
    pub fn cache_image(&self, tools: &ToolCache, image_tag: &str) -> Result<()> {
        if self.cached_images.borrow().contains(image_tag) {
            return Ok(());
        }
        let image_id = tools.subprocess.check_output(
            &cmd_args!["docker", "images", "-q", image_tag],
            &Self::subprocess_options(),
        )?;
        if image_id.trim().is_empty() {
            tools.console.prefixed(
                Self::FULL_NAME,
                format!("Downloading Docker base image for {}...", image_tag),
            );
            tools
                .subprocess
                .run(
                    &cmd_args!["docker", "pull", image_tag],
                    &Self::subprocess_options().no_stream(),
                )
                .map_err(|_| {
                    BriefcaseError::command(format!(
                        "Unable to obtain the Docker image for {}. Is the image name correct?",
                        image_tag
                    ))
                })?;
        }
        self.cached_images.borrow_mut().insert(image_tag.to_string());
        Ok(())
    }

    /// Run a simple command in a throwaway container and capture its output
    pub fn check_output(&self, tools: &ToolCache, args: &[String], image_tag: &str) -> Result<String> {
        self.cache_image(tools, image_tag)?;
        let run = DockerRun {
            image_tag,
            ..Default::default()
        };
        let (args, options) = self.dockerize_args(args, &run, &SubprocessOptions::new());
        tools.subprocess.check_output(&args, &options)
    }

    /// Translate a command into a `docker run` invocation.
    ///
    /// Returns the docker command line and the options for the host-side call.
    /// Environment and working directory move into the container; the host
    /// call only carries the docker CLI environment.
    pub fn dockerize_args(
        &self,
        args: &[String],
        run: &DockerRun<'_>,
        options: &SubprocessOptions,
    ) -> (Vec<String>, SubprocessOptions) {
        let mut cmdline = cmd_args!["docker", "run", "--rm"];
        if run.interactive {
            cmdline.push("-it".to_string());
        }
        for (source, target) in &run.mounts {
            cmdline.push("--volume".to_string());
            cmdline.push(format!("{}:{}:z", source, target));
        }
        for (key, value) in &run.env {
            cmdline.push("--env".to_string());
            cmdline.push(format!("{}={}", key, self.dockerize_path(value, &run.path_map)));
        }
        if let Some(cwd) = &run.cwd {
            cmdline.push("--workdir".to_string());
            cmdline.push(self.dockerize_path(cwd, &run.path_map));
        }
        cmdline.push(run.image_tag.to_string());
        if !run.unset_env.is_empty() {
            cmdline.push("env".to_string());
            for key in &run.unset_env {
                cmdline.push("-u".to_string());
                cmdline.push(key.clone());
            }
        }
        cmdline.extend(args.iter().map(|arg| self.dockerize_path(arg, &run.path_map)));

        let mut host_options = Self::subprocess_options();
        host_options.check = options.check;
        host_options.stream_output = options.stream_output;
        host_options.interactive = options.interactive;
        host_options.quiet = options.quiet;
        (cmdline, host_options)
    }

    /// Rewrite host paths in `arg` to their container locations
    pub fn dockerize_path(&self, arg: &str, path_map: &[(String, String)]) -> String {
        path_map
            .iter()
            .fold(arg.to_string(), |arg, (source, target)| arg.replace(source.as_str(), target))
    }
}

/// What to build the image for an app's Docker context from
#[derive(Debug, Clone)]
pub struct DockerImageSpec {
    pub app_name: String,
    pub image_tag: String,
    pub dockerfile_path: PathBuf,
    /// Directory used as the docker build context
    pub build_context: PathBuf,
    /// System packages needed to build and run the app
    pub system_requires: Vec<String>,
    pub extra_build_args: Vec<String>,
    pub host_bundle_path: PathBuf,
    pub host_data_path: PathBuf,
    /// `major.minor` of the Python inside the image
    pub python_version: String,
}

/// Runs an app's commands inside the app's Docker image.
///
/// The bundle is mounted at `/app` and the briefcase data directory at
/// `/briefcase`; host paths under either are rewritten in arguments,
/// environment values and the working directory.
#[derive(Debug)]
pub struct DockerAppContext {
    subprocess: Subprocess,
    docker: Rc<Docker>,
    image_tag: String,
    host_bundle_path: PathBuf,
    host_data_path: PathBuf,
    python_version: String,
    host_python: PathBuf,
}

#[cfg(unix)]
fn host_ids() -> (u32, u32) {
    // SAFETY: getuid/getgid cannot fail
    unsafe { (libc::getuid(), libc::getgid()) }
}

#[cfg(not(unix))]
fn host_ids() -> (u32, u32) {
    (1000, 1000)
}

impl DockerAppContext {
    pub const DOCKER_BRIEFCASE_PATH: &'static str = "/briefcase";

    /// Verify Docker, then build (or refresh) the app's image
    pub fn prepare(tools: &ToolCache, spec: &DockerImageSpec) -> Result<Self> {
        let docker = Docker::verify(tools)?;
        info!(app = %spec.app_name, image = %spec.image_tag, "building docker image");

        tools
            .console
            .prefixed(&spec.app_name, "Building Docker container image...");
        let wait_bar = tools.console.wait_bar("Building Docker image");
        let (uid, gid) = host_ids();
        let mut args = cmd_args![
            "docker",
            "buildx",
            "build",
            "--load",
            "--progress",
            "plain",
            "--tag",
            spec.image_tag,
            "--file",
            path_arg(&spec.dockerfile_path),
            "--build-arg",
            format!("SYSTEM_REQUIRES={}", spec.system_requires.join(" ")),
            "--build-arg",
            format!("HOST_UID={}", uid),
            "--build-arg",
            format!("HOST_GID={}", gid),
            path_arg(&spec.build_context),
        ];
        args.extend(spec.extra_build_args.iter().cloned());

        tools
            .subprocess
            .run(&args, &Docker::subprocess_options())
            .map_err(|e| match e {
                BriefcaseError::Interrupted => e,
                _ => BriefcaseError::command(format!(
                    "Error building Docker container image for {}.",
                    spec.app_name
                )),
            })?;
        wait_bar.done();

        Ok(Self {
            subprocess: tools.subprocess.clone(),
            docker,
            image_tag: spec.image_tag.clone(),
            host_bundle_path: spec.host_bundle_path.clone(),
            host_data_path: spec.host_data_path.clone(),
            python_version: spec.python_version.clone(),
            host_python: tools.host_python.clone(),
        })
    }

    pub fn image_tag(&self) -> &str {
        &self.image_tag
    }

    fn mounts(&self) -> Vec<(String, String)> {
        vec![
            (path_arg(&self.host_bundle_path), "/app".to_string()),
            (
                path_arg(&self.host_data_path),
                Self::DOCKER_BRIEFCASE_PATH.to_string(),
            ),
        ]
    }

    /// Mounts double as path mappings, alongside the host Python which maps
    /// to the versioned interpreter in the image. Longer sources are applied
    /// first so nested host paths map correctly.
    fn path_map(&self) -> Vec<(String, String)> {
        let mut path_map = self.mounts();
        path_map.push((
            path_arg(&self.host_python),
            format!("python{}", self.python_version),
        ));
        path_map.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        path_map
    }

    fn dockerize(&self, args: &[String], options: &SubprocessOptions) -> (Vec<String>, SubprocessOptions) {
        let mut env = BTreeMap::new();
        let mut unset_env = Vec::new();
        for (key, value) in &options.env {
            match value {
                Some(value) => {
                    env.insert(key.clone(), value.clone());
                }
                None => unset_env.push(key.clone()),
            }
        }
        let run = DockerRun {
            image_tag: &self.image_tag,
            interactive: options.interactive,
            mounts: self.mounts(),
            path_map: self.path_map(),
            env,
            unset_env,
            cwd: options.cwd.as_deref().map(path_arg),
        };
        self.docker.dockerize_args(args, &run, options)
    }

    /// Path of `path` as seen from inside the container
    pub fn container_path(&self, path: &Path) -> String {
        self.docker.dockerize_path(&path_arg(path), &self.path_map())
    }
}

impl AppContext for DockerAppContext {
    fn run(&self, args: &[String], options: &SubprocessOptions) -> Result<CompletedProcess> {
        let (args, mut options) = self.dockerize(args, options);
        if options.interactive {
            options.stream_output = false;
        }
        self.subprocess.run(&args, &options)
    }

    fn check_output(&self, args: &[String], options: &SubprocessOptions) -> Result<String> {
        let (args, options) = self.dockerize(args, options);
        self.subprocess.check_output(&args, &options)
    }

    fn popen(&self, args: &[String], options: &SubprocessOptions) -> Result<Popen> {
        let (args, options) = self.dockerize(args, options);
        self.subprocess.popen(&args, &options)
    }

    fn subprocess(&self) -> &Subprocess {
        &self.subprocess
    }
}
