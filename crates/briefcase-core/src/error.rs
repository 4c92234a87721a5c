//! Error types for briefcase

use std::fmt;

use thiserror::Error;

/// Result type alias using BriefcaseError
pub type Result<T> = std::result::Result<T, BriefcaseError>;

/// Boxed cause attached to wrapping errors
pub type Cause = Box<dyn std::error::Error + Send + Sync>;

/// A subprocess that exited with a non-zero return code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalledProcessError {
    /// The command line that was invoked
    pub args: Vec<String>,
    /// Exit status; negative values are the signal that terminated the process
    pub returncode: i32,
    /// Captured output, when the call captured any
    pub output: Option<String>,
}

impl CalledProcessError {
    pub fn new(args: &[String], returncode: i32) -> Self {
        Self {
            args: args.to_vec(),
            returncode,
            output: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }
}

impl fmt::Display for CalledProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Command '{}' returned non-zero exit status {}.",
            self.args.join(" "),
            self.returncode
        )
    }
}

impl std::error::Error for CalledProcessError {}

/// Main error type for briefcase operations
#[derive(Debug, Error)]
pub enum BriefcaseError {
    /// No subcommand was given
    #[error("{help}")]
    NoCommand { help: String },

    /// The user asked for the list of output formats
    #[error(
        "Available formats for {platform}: {}\nDefault format: {default}",
        .choices.join(", ")
    )]
    ShowOutputFormats {
        platform: String,
        default: String,
        choices: Vec<String>,
    },

    #[error("Invalid platform '{requested}'; (choose from: {})", .choices.join(", "))]
    InvalidPlatform {
        requested: String,
        choices: Vec<String>,
    },

    #[error("Invalid format '{requested}'; (choose from: {})", .choices.join(", "))]
    InvalidFormat {
        requested: String,
        choices: Vec<String>,
    },

    #[error(
        "The {command} command for the {platform} {output_format} format has not been implemented (yet!)."
    )]
    UnsupportedCommand {
        platform: String,
        output_format: String,
        command: String,
    },

    /// Malformed or invalid project configuration
    #[error("Briefcase configuration error: {0}")]
    Config(String),

    /// Generic command failure with an actionable message
    #[error("{0}")]
    Command(String),

    #[error("Unable to {action}; is your computer offline?")]
    NetworkFailure {
        action: String,
        #[source]
        source: Option<Cause>,
    },

    #[error("Unable to download {url}; is the URL correct?")]
    MissingNetworkResource { url: String },

    #[error("Unable to download {url} (status code {status_code})")]
    BadNetworkResource { url: String, status_code: u16 },

    #[error("Unable to locate '{tool}'. Has it been installed?")]
    MissingTool { tool: String },

    #[error("'{tool}' is using an install that is user managed.")]
    NonManagedTool { tool: String },

    #[error("'{tool}' found, but it appears to be corrupted.")]
    CorruptTool { tool: String },

    #[error("{name} is not supported on {host_os}")]
    UnsupportedHost { name: String, host_os: String },

    #[error("Unable to parse command output: {0}")]
    CommandOutputParse(String),

    #[error("Application source '{0}' does not exist.")]
    MissingAppSources(String),

    #[error(
        "Unable to install requirements. This may be because one of your\n\
         requirements is invalid, or because pip was unable to connect\n\
         to the PyPI server.\n{install_hint}"
    )]
    DependencyInstall {
        install_hint: String,
        #[source]
        source: Option<Cause>,
    },

    #[error("Template does not support {0}")]
    TemplateUnsupportedVersion(String),

    /// Tests ran to completion and reported failure
    #[error("Test suite failed")]
    TestSuiteFailure,

    #[error("Aborted by user.")]
    Interrupted,

    #[error(transparent)]
    Process(#[from] CalledProcessError),

    /// Failures collected while processing several apps in one invocation
    #[error("{}", format_app_failures(.0))]
    MultipleApps(Vec<(String, BriefcaseError)>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_app_failures(failures: &[(String, BriefcaseError)]) -> String {
    failures
        .iter()
        .map(|(app, err)| format!("{}: {}", app, err))
        .collect::<Vec<_>>()
        .join("\n")
}

impl BriefcaseError {
    /// Create a command error
    pub fn command(message: impl Into<String>) -> Self {
        Self::Command(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a network failure with no underlying cause attached
    pub fn network(action: impl Into<String>) -> Self {
        Self::NetworkFailure {
            action: action.into(),
            source: None,
        }
    }

    /// Create a dependency install failure wrapping the installer error
    pub fn dependency_install(install_hint: impl Into<String>, source: Option<Cause>) -> Self {
        Self::DependencyInstall {
            install_hint: install_hint.into(),
            source,
        }
    }

    pub fn missing_tool(tool: impl Into<String>) -> Self {
        Self::MissingTool { tool: tool.into() }
    }

    /// Get exit code for the CLI
    pub fn error_code(&self) -> i32 {
        match self {
            Self::NoCommand { .. } => -10,
            Self::ShowOutputFormats { .. } => 0,
            Self::InvalidPlatform { .. } => -20,
            Self::InvalidFormat { .. } => -21,
            Self::UnsupportedCommand { .. } => -30,
            Self::Config(_) => 100,
            Self::TestSuiteFailure => 1,
            Self::Interrupted => -42,
            Self::MultipleApps(failures) => failures
                .first()
                .map(|(_, err)| err.error_code())
                .unwrap_or(200),
            Self::Process(_) | Self::Io(_) => 1,
            _ => 200,
        }
    }

    /// Outcomes that are printed as plain output rather than as an error
    pub fn is_help_text(&self) -> bool {
        matches!(self, Self::NoCommand { .. } | Self::ShowOutputFormats { .. })
    }

    /// Outcomes that do not warrant saving a failure transcript
    pub fn skip_logfile(&self) -> bool {
        self.is_help_text()
            || matches!(
                self,
                Self::InvalidPlatform { .. }
                    | Self::InvalidFormat { .. }
                    | Self::UnsupportedCommand { .. }
                    | Self::TestSuiteFailure
                    | Self::Interrupted
            )
    }

    /// Whether the failure came from the user interrupting the process
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(BriefcaseError::NoCommand { help: "x".into() }.error_code(), -10);
        assert_eq!(BriefcaseError::config("bad").error_code(), 100);
        assert_eq!(BriefcaseError::command("bad").error_code(), 200);
        assert_eq!(BriefcaseError::missing_tool("git").error_code(), 200);
        assert_eq!(BriefcaseError::TestSuiteFailure.error_code(), 1);
        assert_eq!(BriefcaseError::Interrupted.error_code(), -42);
    }

    #[test]
    fn test_messages() {
        let err = BriefcaseError::InvalidFormat {
            requested: "dmg".into(),
            choices: vec!["app".into(), "Xcode".into()],
        };
        assert_eq!(err.to_string(), "Invalid format 'dmg'; (choose from: app, Xcode)");

        let err = BriefcaseError::UnsupportedCommand {
            platform: "iOS".into(),
            output_format: "Xcode".into(),
            command: "package".into(),
        };
        assert_eq!(
            err.to_string(),
            "The package command for the iOS Xcode format has not been implemented (yet!)."
        );

        let err = BriefcaseError::UnsupportedHost {
            name: "Flatpak".into(),
            host_os: "Darwin".into(),
        };
        assert_eq!(err.to_string(), "Flatpak is not supported on Darwin");

        let err = BriefcaseError::network("download support package");
        assert_eq!(
            err.to_string(),
            "Unable to download support package; is your computer offline?"
        );
    }

    #[test]
    fn test_show_formats_is_help_text() {
        let err = BriefcaseError::ShowOutputFormats {
            platform: "linux".into(),
            default: "AppImage".into(),
            choices: vec!["AppImage".into(), "flatpak".into()],
        };
        assert!(err.is_help_text());
        assert_eq!(err.error_code(), 0);
        assert_eq!(
            err.to_string(),
            "Available formats for linux: AppImage, flatpak\nDefault format: AppImage"
        );
    }

    #[test]
    fn test_multiple_apps_uses_first_code() {
        let err = BriefcaseError::MultipleApps(vec![
            ("first".into(), BriefcaseError::config("broken")),
            ("second".into(), BriefcaseError::command("failed")),
        ]);
        assert_eq!(err.error_code(), 100);
        assert_eq!(
            err.to_string(),
            "first: Briefcase configuration error: broken\nsecond: failed"
        );
    }

    #[test]
    fn test_called_process_error_display() {
        let err = CalledProcessError::new(&["git".to_string(), "--version".to_string()], 2);
        assert_eq!(
            err.to_string(),
            "Command 'git --version' returned non-zero exit status 2."
        );
        let wrapped: BriefcaseError = err.into();
        assert_eq!(wrapped.error_code(), 1);
    }

    #[test]
    fn test_skip_logfile() {
        assert!(BriefcaseError::TestSuiteFailure.skip_logfile());
        assert!(BriefcaseError::Interrupted.skip_logfile());
        assert!(!BriefcaseError::command("x").skip_logfile());
    }
}
