//! Configuration types

use serde::{Deserialize, Serialize};
use toml::Table;

/// Project-wide settings from `[tool.briefcase]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    pub project_name: String,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub bundle: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub author: Option<String>,

    #[serde(default)]
    pub author_email: Option<String>,

    /// Keys briefcase does not interpret itself
    #[serde(flatten)]
    pub extra: Table,
}

/// Final, fully layered configuration for a single app
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub app_name: String,
    pub version: String,
    pub bundle: String,
    pub description: String,
    pub sources: Vec<String>,

    #[serde(default)]
    pub formal_name: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub author: Option<String>,

    #[serde(default)]
    pub author_email: Option<String>,

    #[serde(default)]
    pub requires: Vec<String>,

    #[serde(default)]
    pub test_requires: Vec<String>,

    #[serde(default)]
    pub test_sources: Vec<String>,

    /// Template URL or local path overriding the format default
    #[serde(default)]
    pub template: Option<String>,

    #[serde(default)]
    pub template_branch: Option<String>,

    /// Support package URL or local path overriding the format default
    #[serde(default)]
    pub support_package: Option<String>,

    #[serde(default)]
    pub support_revision: Option<String>,

    #[serde(default = "default_true")]
    pub supported: bool,

    #[serde(default)]
    pub console_app: bool,

    /// Glob patterns, relative to the bundle, removed after install
    #[serde(default)]
    pub cleanup_paths: Vec<String>,

    /// Custom exit sentinel pattern
    #[serde(default)]
    pub exit_regex: Option<String>,

    #[serde(default)]
    pub icon: Option<String>,

    /// Build number
    #[serde(default)]
    pub build: Option<String>,

    #[serde(default)]
    pub requirement_installer_args: Vec<String>,

    /// Format-specific keys (for example `flatpak_runtime`)
    #[serde(flatten)]
    pub extra: Table,

    #[serde(skip)]
    pub test_mode: bool,

    #[serde(skip)]
    pub debugger: Option<DebuggerConfig>,
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Human-readable app name
    pub fn formal_name(&self) -> &str {
        self.formal_name.as_deref().unwrap_or(&self.app_name)
    }

    /// App name in the form usable as a Python module
    pub fn module_name(&self) -> String {
        self.app_name.replace('-', "_")
    }

    /// App name in the form usable in a bundle identifier
    pub fn bundle_name(&self) -> String {
        self.app_name.replace('_', "-")
    }

    pub fn bundle_identifier(&self) -> String {
        format!("{}.{}", self.bundle, self.bundle_name())
    }

    /// Bundle in the form usable as a package namespace
    pub fn package_name(&self) -> String {
        self.bundle.replace('-', "_")
    }

    /// Formal name reduced to a valid class identifier
    pub fn class_name(&self) -> String {
        let mut name: String = self
            .formal_name()
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            name.insert(0, '_');
        }
        name
    }

    /// Module launched when the app starts
    pub fn main_module(&self) -> String {
        if self.test_mode {
            format!("tests.{}", self.module_name())
        } else {
            self.module_name()
        }
    }

    /// Requirements to install, including test requirements in test mode
    pub fn requirements(&self) -> Vec<String> {
        let mut requires = self.requires.clone();
        if self.test_mode {
            requires.extend(self.test_requires.iter().cloned());
        }
        requires
    }

    /// Sources to install, including test sources in test mode
    pub fn all_sources(&self) -> Vec<String> {
        let mut sources = self.sources.clone();
        if self.test_mode {
            sources.extend(self.test_sources.iter().cloned());
        }
        sources
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.extra.get(key).and_then(|v| v.as_bool())
    }
}

/// Which side opens the debugger connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    /// The app listens and the debugger client attaches
    Server,
    /// The app connects out to a listening debugger
    Client,
}

impl ConnectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Client => "client",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "server" => Some(Self::Server),
            "client" => Some(Self::Client),
            _ => None,
        }
    }
}

/// Remote debugger requested for a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebuggerConfig {
    pub debugger: String,
    pub mode: ConnectionMode,
    pub host: String,
    pub port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(table: &str) -> AppConfig {
        toml::from_str(table).unwrap()
    }

    fn sample() -> AppConfig {
        app(r#"
            app_name = "my-app"
            formal_name = "2nd Brain App!"
            version = "1.2.3"
            bundle = "com.some-example"
            description = "An app"
            sources = ["src/my_app"]
            requires = ["toga"]
            test_requires = ["pytest"]
            test_sources = ["tests"]
            flatpak_runtime = "org.gnome.Platform"
        "#)
    }

    #[test]
    fn test_derived_names() {
        let app = sample();
        assert_eq!(app.module_name(), "my_app");
        assert_eq!(app.bundle_name(), "my-app");
        assert_eq!(app.bundle_identifier(), "com.some-example.my-app");
        assert_eq!(app.package_name(), "com.some_example");
        assert_eq!(app.class_name(), "_2ndBrainApp");
    }

    #[test]
    fn test_defaults() {
        let app = sample();
        assert!(app.supported);
        assert!(!app.console_app);
        assert!(app.cleanup_paths.is_empty());
        assert_eq!(app.get_str("flatpak_runtime"), Some("org.gnome.Platform"));
        assert_eq!(app.get_str("missing"), None);
    }

    #[test]
    fn test_test_mode_changes_module_and_requirements() {
        let mut app = sample();
        assert_eq!(app.main_module(), "my_app");
        assert_eq!(app.requirements(), vec!["toga"]);
        assert_eq!(app.all_sources(), vec!["src/my_app"]);

        app.test_mode = true;
        assert_eq!(app.main_module(), "tests.my_app");
        assert_eq!(app.requirements(), vec!["toga", "pytest"]);
        assert_eq!(app.all_sources(), vec!["src/my_app", "tests"]);
    }

    #[test]
    fn test_connection_mode_parse() {
        assert_eq!(ConnectionMode::parse("SERVER"), Some(ConnectionMode::Server));
        assert_eq!(ConnectionMode::parse("client"), Some(ConnectionMode::Client));
        assert_eq!(ConnectionMode::parse("peer"), None);
    }
}
