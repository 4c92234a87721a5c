//! Flatpak, and the Flatpak sandbox execution context

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use briefcase_core::{BriefcaseError, Result};
use tracing::debug;

use crate::cache::ToolCache;
use crate::cmd_args;
use crate::context::AppContext;
use crate::subprocess::{path_arg, CompletedProcess, Popen, Subprocess, SubprocessOptions};
use crate::tool::{Tool, VerifyOptions};

pub const DEFAULT_REPO_ALIAS: &str = "flathub";
pub const DEFAULT_REPO_URL: &str = "https://flathub.org/repo/flathub.flatpakrepo";

const NOT_INSTALLED_ERROR: &str = "\
Briefcase requires the Flatpak toolchain, but it does not appear to be installed.

Instructions for installing the Flatpak toolchain can be found at:

    https://flatpak.org/setup/

You must install both flatpak and flatpak-builder.";

const BUILDER_NOT_INSTALLED_ERROR: &str = "\
Briefcase requires the full Flatpak development toolchain, but flatpak-builder
does not appear to be installed.

Instructions for installing the Flatpak toolchain can be found at:

    https://flatpak.org/setup/

You must install both flatpak and flatpak-builder.";

fn unknown_version_warning(command: &str) -> String {
    format!(
        "\n\
*************************************************************************\n\
** WARNING: Unable to determine the version of {:<24}**\n\
*************************************************************************\n\
\n\
    Briefcase will proceed, assuming everything is OK. If you\n\
    experience problems, this is almost certainly the cause of those\n\
    problems.\n\
\n\
    Please report this as a bug at:\n\
\n\
      https://github.com/beeware/briefcase/issues/new\n\
\n\
    In your report, please including the output from running:\n\
\n\
      {} --version\n\
\n\
    from the command prompt.\n\
\n\
*************************************************************************\n",
        command, command
    )
}

/// Outcome of checking `<tool> --version` output
#[derive(Debug, PartialEq, Eq)]
enum VersionCheck {
    Ok,
    TooOld,
    Unknown,
}

/// Expects `<expected_name> <major>.<minor>...` and requires major >= 1
fn check_version(output: &str, expected_name: &str) -> VersionCheck {
    let mut parts = output.trim().split(' ');
    if parts.next() != Some(expected_name) {
        return VersionCheck::Unknown;
    }
    let major = parts
        .next()
        .and_then(|version| version.split('.').next())
        .and_then(|major| major.parse::<u32>().ok());
    match major {
        Some(0) => VersionCheck::TooOld,
        Some(_) => VersionCheck::Ok,
        None => VersionCheck::Unknown,
    }
}

/// The Flatpak toolchain: `flatpak` and `flatpak-builder`
#[derive(Debug)]
pub struct Flatpak;

impl Flatpak {
    fn verify_command(tools: &ToolCache, command: &str, expected_name: &str, not_installed: &str) -> Result<()> {
        let output = tools
            .subprocess
            .check_output(&cmd_args![command, "--version"], &SubprocessOptions::new().quiet());
        match output {
            Ok(output) => match check_version(&output, expected_name) {
                VersionCheck::Ok => Ok(()),
                VersionCheck::TooOld => Err(BriefcaseError::command(format!(
                    "Briefcase requires {} 1.0 or later.",
                    expected_name
                ))),
                VersionCheck::Unknown => {
                    tools.console.warning(unknown_version_warning(command));
                    Ok(())
                }
            },
            Err(BriefcaseError::Io(e)) => {
                debug!(command, error = %e, "flatpak tool is not available");
                Err(BriefcaseError::command(not_installed))
            }
            Err(BriefcaseError::Process(_)) => Err(BriefcaseError::command(format!(
                "Unable to invoke {}.",
                command
            ))),
            Err(e) => Err(e),
        }
    }
}

impl Tool for Flatpak {
    const NAME: &'static str = "flatpak";
    const FULL_NAME: &'static str = "Flatpak";

    fn supported_host_os() -> &'static [&'static str] {
        &["Linux"]
    }

    fn verify_install(tools: &ToolCache, _options: VerifyOptions) -> Result<Self> {
        Self::verify_command(tools, "flatpak", "Flatpak", NOT_INSTALLED_ERROR)?;
        Self::verify_command(tools, "flatpak-builder", "flatpak-builder", BUILDER_NOT_INSTALLED_ERROR)?;
        Ok(Flatpak)
    }
}

impl Flatpak {
    /// Register a remote repository for the user, if it isn't already known
    pub fn verify_repo(&self, tools: &ToolCache, repo_alias: &str, url: &str) -> Result<()> {
        tools
            .subprocess
            .run(
                &cmd_args!["flatpak", "remote-add", "--user", "--if-not-exists", repo_alias, url],
                &SubprocessOptions::new(),
            )
            .map_err(|_| {
                BriefcaseError::command(format!(
                    "Unable to add Flatpak repo {} with alias {}.",
                    url, repo_alias
                ))
            })?;
        Ok(())
    }

    /// Install a runtime and its SDK from `repo_alias`
    pub fn verify_runtime(&self, tools: &ToolCache, repo_alias: &str, runtime: &str, runtime_version: &str, sdk: &str) -> Result<()> {
        let runtime_ref = format!("{}/{}/{}", runtime, tools.host_arch, runtime_version);
        let sdk_ref = format!("{}/{}/{}", sdk, tools.host_arch, runtime_version);
        tools
            .subprocess
            .run(
                &cmd_args!["flatpak", "install", "--assumeyes", "--user", repo_alias, runtime_ref, sdk_ref],
                // flatpak install animates its progress output
                &SubprocessOptions::new().no_stream(),
            )
            .map_err(|_| {
                BriefcaseError::command(format!(
                    "Unable to install Flatpak runtime {} and SDK {} from repo {}.",
                    runtime_ref, sdk_ref, repo_alias
                ))
            })?;
        Ok(())
    }

    /// Build the manifest in `path` and install the result for the user.
    ///
    /// On success a launcher script named after the bundle identifier is
    /// written next to the manifest; it doubles as the build marker.
    pub fn build(&self, tools: &ToolCache, bundle_identifier: &str, app_name: &str, path: &Path) -> Result<PathBuf> {
        tools
            .subprocess
            .run(
                &cmd_args![
                    "flatpak-builder",
                    "--force-clean",
                    "--repo",
                    "repo",
                    "--install",
                    "--user",
                    "build",
                    "manifest.yml"
                ],
                &SubprocessOptions::new().cwd(path),
            )
            .map_err(|e| match e {
                BriefcaseError::Interrupted => e,
                _ => BriefcaseError::command(format!("Error while building app {}.", app_name)),
            })?;

        let bin_path = path.join(bundle_identifier);
        fs::write(
            &bin_path,
            format!(
                "#!/bin/sh\n# echo To run this flatpak, run:\nflatpak run {}\n",
                bundle_identifier
            ),
        )?;
        set_executable(&bin_path)?;
        Ok(bin_path)
    }

    /// Start the installed app so its output can be streamed
    pub fn run(&self, tools: &ToolCache, bundle_identifier: &str, args: &[String], main_module: Option<&str>) -> Result<Popen> {
        let mut options = SubprocessOptions::new();
        if let Some(module) = main_module {
            options = options.env("BRIEFCASE_MAIN_MODULE", module);
        }
        let mut command = cmd_args!["flatpak", "run", bundle_identifier];
        command.extend(args.iter().cloned());
        tools.subprocess.popen(&command, &options)
    }

    /// Export a single-file `.flatpak` bundle for distribution
    pub fn bundle(
        &self,
        tools: &ToolCache,
        repo_url: &str,
        bundle_identifier: &str,
        app_name: &str,
        version: &str,
        build_path: &Path,
        output_path: &Path,
    ) -> Result<()> {
        tools
            .subprocess
            .run(
                &cmd_args![
                    "flatpak",
                    "build-bundle",
                    "--runtime-repo",
                    repo_url,
                    "repo",
                    path_arg(output_path),
                    bundle_identifier,
                    version
                ],
                &SubprocessOptions::new().cwd(build_path),
            )
            .map_err(|e| match e {
                BriefcaseError::Interrupted => e,
                _ => BriefcaseError::command(format!(
                    "Unable to build a Flatpak bundle for app {}.",
                    app_name
                )),
            })?;
        Ok(())
    }
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

/// Runs commands inside an installed app's Flatpak sandbox.
///
/// The bundle directory maps to `/app` and the host Python to the sandbox's
/// `python3`.
#[derive(Debug)]
pub struct FlatpakAppContext {
    subprocess: Subprocess,
    _flatpak: Rc<Flatpak>,
    bundle_identifier: String,
    path_map: Vec<(String, String)>,
}

impl FlatpakAppContext {
    pub fn new(tools: &ToolCache, bundle_identifier: &str, host_bundle_path: &Path) -> Result<Self> {
        let flatpak = Flatpak::verify(tools)?;
        let mut path_map = vec![
            (path_arg(host_bundle_path), "/app".to_string()),
            (path_arg(&tools.host_python), "python3".to_string()),
        ];
        path_map.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Ok(Self {
            subprocess: tools.subprocess.clone(),
            _flatpak: flatpak,
            bundle_identifier: bundle_identifier.to_string(),
            path_map,
        })
    }

    fn translate(&self, value: &str) -> String {
        self.path_map
            .iter()
            .fold(value.to_string(), |value, (source, target)| value.replace(source.as_str(), target))
    }

    fn sandbox_args(&self, args: &[String], options: &SubprocessOptions) -> Result<(Vec<String>, SubprocessOptions)> {
        let (head, rest) = args
            .split_first()
            .ok_or_else(|| BriefcaseError::command("Unable to run an empty command."))?;
        let mut command = cmd_args!["flatpak", "run", format!("--command={}", self.translate(head))];
        for (key, value) in &options.env {
            match value {
                Some(value) => command.push(format!("--env={}={}", key, self.translate(value))),
                None => command.push(format!("--unset-env={}", key)),
            }
        }
        if let Some(cwd) = &options.cwd {
            command.push(format!("--cwd={}", self.translate(&path_arg(cwd))));
        }
        command.push(self.bundle_identifier.clone());
        command.extend(rest.iter().map(|arg| self.translate(arg)));

        let mut host_options = SubprocessOptions::new();
        host_options.check = options.check;
        host_options.stream_output = options.stream_output;
        host_options.interactive = options.interactive;
        host_options.quiet = options.quiet;
        Ok((command, host_options))
    }
}

impl AppContext for FlatpakAppContext {
    fn run(&self, args: &[String], options: &SubprocessOptions) -> Result<CompletedProcess> {
        let (args, options) = self.sandbox_args(args, options)?;
        self.subprocess.run(&args, &options)
    }

    fn check_output(&self, args: &[String], options: &SubprocessOptions) -> Result<String> {
        let (args, options) = self.sandbox_args(args, options)?;
        self.subprocess.check_output(&args, &options)
    }

    fn popen(&self, args: &[String], options: &SubprocessOptions) -> Result<Popen> {
        let (args, options) = self.sandbox_args(args, options)?;
        self.subprocess.popen(&args, &options)
    }

    fn subprocess(&self) -> &Subprocess {
        &self.subprocess
    }
}
