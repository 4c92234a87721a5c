//! Xcode and the Xcode command line tools

use std::path::{Path, PathBuf};

use briefcase_core::{BriefcaseError, Result};

use crate::cache::ToolCache;
use crate::cmd_args;
use crate::subprocess::SubprocessOptions;
use crate::tool::{parse_loose_version, Tool, VerifyOptions};

/// Oldest Xcode the Apple templates build with
pub const MIN_XCODE_VERSION: (u64, u64, u64) = (13, 0, 0);

const DEFAULT_XCODE_LOCATION: &str = "/Applications/Xcode.app";

const NO_XCODE_ERROR: &str = "\
Could not find an Xcode installation.

To select an existing Xcode installation, run:

    $ sudo xcode-select --switch path/to/Xcode.app

or install Xcode from the macOS App Store. Once you have installed Xcode,
you can re-run Briefcase.";

const UNKNOWN_XCODE_VERSION_ERROR: &str = "\
An Xcode install appears to exist, but Briefcase was unable to
determine the current Xcode version. Running:

    $ xcodebuild -version

should return the current Xcode version, but it raised an error.

You may need to re-install Xcode. Re-run Briefcase once that
installation is complete.";

const UNKNOWN_XCODE_VERSION_WARNING: &str = "
*************************************************************************
** WARNING: Unable to determine the version of Xcode that is installed **
*************************************************************************

    Briefcase will proceed, assuming everything is OK. If you experience
    problems, this is almost certainly the cause of those problems.

*************************************************************************
";

const CLI_TOOLS_NOT_INSTALLED_ERROR: &str = "\
The command line developer tools are not installed.

You should be shown a dialog prompting you to install them. Select \"Install\"
to continue, and re-run Briefcase once that installation is complete.";

const CLI_TOOLS_UNKNOWN_WARNING: &str = "
*************************************************************************
** WARNING: Unable to determine if Xcode is installed                  **
*************************************************************************

    Briefcase will proceed, assuming everything is OK. If you experience
    problems, this is almost certainly the cause of those problems.

*************************************************************************
";

/// The Xcode command line developer tools
#[derive(Debug)]
pub struct XcodeCliTools;

impl Tool for XcodeCliTools {
    const NAME: &'static str = "xcode_cli";
    const FULL_NAME: &'static str = "Xcode Command Line Tools";

    fn supported_host_os() -> &'static [&'static str] {
        &["Darwin"]
    }

    /// `xcode-select --install` succeeds (and pops up an installer) only
    /// when the tools are missing; exit status 1 means they are present.
    fn verify_install(tools: &ToolCache, _options: VerifyOptions) -> Result<Self> {
        match tools
            .subprocess
            .check_output(&cmd_args!["xcode-select", "--install"], &SubprocessOptions::new().quiet())
        {
            Ok(_) => Err(BriefcaseError::command(CLI_TOOLS_NOT_INSTALLED_ERROR)),
            Err(BriefcaseError::Process(err)) if err.returncode == 1 => Ok(XcodeCliTools),
            Err(BriefcaseError::Process(_)) => {
                tools.console.warning(CLI_TOOLS_UNKNOWN_WARNING);
                Ok(XcodeCliTools)
            }
            Err(e) => Err(e),
        }
    }
}

/// A full Xcode install
#[derive(Debug)]
pub struct Xcode {
    /// Version reported by `xcodebuild -version`, when it could be read
    pub version: Option<semver::Version>,
}

fn command_line_tools_selected(xcode_location: &Path) -> String {
    let preamble = if xcode_location.exists() {
        "Xcode appears to be installed, but the active developer directory is the Xcode\n\
         command line tools. To make Xcode the active developer directory, run:\n\n    \
         $ sudo xcode-select --switch /Applications/Xcode.app\n"
    } else {
        "You have the Xcode command line tools installed; however, Briefcase requires\n\
         a full Xcode install. Xcode can be downloaded from the macOS App Store at\n\
         <https://apps.apple.com/au/app/xcode/id497799835?mt=12>.\n"
    };
    format!(
        "{}\nOr, to use a version of Xcode installed in a non-default location:\n\n    \
         $ sudo xcode-select --switch /path/to/Xcode.app\n\nand then re-run Briefcase.",
        preamble
    )
}

/// The version on the first `Xcode X.Y.Z` line of `xcodebuild -version`
fn parse_xcode_version(output: &str) -> Option<semver::Version> {
    output
        .lines()
        .find_map(|line| line.strip_prefix("Xcode "))
        .and_then(parse_loose_version)
}

impl Xcode {
    fn ensure_installed(tools: &ToolCache, xcode_location: &Path) -> Result<Option<semver::Version>> {
        let quiet = SubprocessOptions::new().quiet();
        if let Err(BriefcaseError::Process(_)) = tools
            .subprocess
            .check_output(&cmd_args!["xcode-select", "-p"], &quiet)
        {
            return Err(BriefcaseError::command(NO_XCODE_ERROR));
        }

        let output = match tools
            .subprocess
            .check_output(&cmd_args!["xcodebuild", "-version"], &quiet)
        {
            Ok(output) => output,
            Err(BriefcaseError::Process(err)) => {
                let output = err.output.unwrap_or_default();
                if output.contains(" is a command line tools instance") {
                    return Err(BriefcaseError::command(command_line_tools_selected(xcode_location)));
                }
                return Err(BriefcaseError::command(UNKNOWN_XCODE_VERSION_ERROR));
            }
            Err(e) => return Err(e),
        };

        let (major, minor, patch) = MIN_XCODE_VERSION;
        let minimum = semver::Version::new(major, minor, patch);
        match parse_xcode_version(&output) {
            Some(version) if version < minimum => Err(BriefcaseError::command(format!(
                "Xcode {} is required; {} is installed. Please update Xcode.",
                minimum, version
            ))),
            Some(version) => Ok(Some(version)),
            None => {
                tools.console.warning(UNKNOWN_XCODE_VERSION_WARNING);
                Ok(None)
            }
        }
    }

    pub fn default_location() -> PathBuf {
        PathBuf::from(DEFAULT_XCODE_LOCATION)
    }
}

impl Tool for Xcode {
    const NAME: &'static str = "xcode";
    const FULL_NAME: &'static str = "Xcode";

    fn supported_host_os() -> &'static [&'static str] {
        &["Darwin"]
    }

    fn verify_install(tools: &ToolCache, _options: VerifyOptions) -> Result<Self> {
        let version = Self::ensure_installed(tools, &Self::default_location())?;
        XcodeCliTools::verify(tools)?;
        Ok(Self { version })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fake_tool_cache;
    use tempfile::TempDir;

    #[test]
    fn test_parse_xcode_version() {
        assert_eq!(
            parse_xcode_version("Xcode 15.2\nBuild version 15C500b\n"),
            Some(semver::Version::new(15, 2, 0))
        );
        assert_eq!(parse_xcode_version("Build version 15C500b\n"), None);
    }

    #[test]
    fn test_verify() {
        let dir = TempDir::new().unwrap();
        let (tools, executor) = fake_tool_cache(dir.path(), "Darwin");
        executor.on(&["xcodebuild", "-version"], 0, "Xcode 15.2\nBuild version 15C500b\n");
        executor.on(&["xcode-select", "--install"], 1, "command line tools are already installed");

        let xcode = Xcode::verify(&tools).unwrap();
        assert_eq!(xcode.version, Some(semver::Version::new(15, 2, 0)));
        assert!(tools.is_verified("xcode_cli"));
    }

    #[test]
    fn test_old_xcode() {
        let dir = TempDir::new().unwrap();
        let (tools, executor) = fake_tool_cache(dir.path(), "Darwin");
        executor.on(&["xcodebuild", "-version"], 0, "Xcode 12.4\n");
        let err = Xcode::verify(&tools).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Xcode 13.0.0 is required; 12.4.0 is installed. Please update Xcode."
        );
    }

    #[test]
    fn test_no_xcode() {
        let dir = TempDir::new().unwrap();
        let (tools, executor) = fake_tool_cache(dir.path(), "Darwin");
        executor.on(&["xcode-select", "-p"], 2, "");
        let err = Xcode::verify(&tools).unwrap_err();
        assert_eq!(err.to_string(), NO_XCODE_ERROR);
    }

    #[test]
    fn test_command_line_tools_selected() {
        let dir = TempDir::new().unwrap();
        let (tools, executor) = fake_tool_cache(dir.path(), "Darwin");
        executor.on(
            &["xcodebuild", "-version"],
            1,
            "xcode-select: error: tool 'xcodebuild' requires Xcode, but active developer \
             directory '/Library/Developer/CommandLineTools' is a command line tools instance",
        );
        let err = Xcode::verify(&tools).unwrap_err();
        assert!(err.to_string().contains("xcode-select --switch /path/to/Xcode.app"));
    }

    #[test]
    fn test_cli_tools_missing() {
        let dir = TempDir::new().unwrap();
        let (tools, _) = fake_tool_cache(dir.path(), "Darwin");
        let err = XcodeCliTools::verify(&tools).unwrap_err();
        assert_eq!(err.to_string(), CLI_TOOLS_NOT_INSTALLED_ERROR);
    }

    #[test]
    fn test_darwin_only() {
        let dir = TempDir::new().unwrap();
        let (tools, _) = fake_tool_cache(dir.path(), "Windows");
        let err = Xcode::verify(&tools).unwrap_err();
        assert_eq!(err.to_string(), "xcode is not supported on Windows");
    }
}
