//! Resolving the target format and loading the project it applies to

use briefcase_core::config::{load_project, parse_config_overrides, ConfigTarget};
use briefcase_core::{AppConfig, Result};
use briefcase_platforms::{select_apps, BuiltinOptions, CommandContext, DebuggerRegistry, PlatformRegistry};
use tracing::{debug, instrument};

use super::{Session, TargetArgs};

pub const PROJECT_FILE: &str = "pyproject.toml";

/// A loaded project, ready to act on with the selected format
pub struct Project {
    pub ctx: CommandContext,
    pub apps: Vec<AppConfig>,
}

impl Project {
    /// Resolve the format named by `target`, then load `pyproject.toml` from
    /// the current directory as seen by that format
    #[instrument(skip_all, fields(platform = ?target.platform, format = ?target.output_format))]
    pub fn load(session: &Session<'_>, target: &TargetArgs) -> Result<Self> {
        let tools = session.tool_cache();
        let registry = PlatformRegistry::with_options(BuiltinOptions {
            use_docker: !target.no_docker,
        })?;

        if target.formats {
            return Err(registry.show_formats(target.platform.as_deref(), &tools.host_os));
        }
        let format = registry.resolve(
            target.platform.as_deref(),
            target.output_format.as_deref(),
            &tools.host_os,
        )?;

        let overrides = parse_config_overrides(&target.config)?;
        let all_platforms = registry.platforms();
        let all_formats = registry.all_format_names();
        let config_target = ConfigTarget {
            platform: format.platform(),
            output_format: format.output_format(),
            all_platforms: &all_platforms,
            all_formats: &all_formats,
        };

        let base_path = std::env::current_dir()?;
        let config = load_project(&base_path.join(PROJECT_FILE), config_target, &overrides)?;
        debug!(
            platform = format.platform(),
            format = format.output_format(),
            apps = config.apps.len(),
            "project loaded"
        );

        let ctx = CommandContext::new(tools, base_path, format).with_isolation(!target.no_isolation);
        Ok(Self {
            ctx,
            apps: config.apps,
        })
    }

    /// The apps named on the command line, or all of them
    pub fn select(&self, names: &[String]) -> Result<Vec<AppConfig>> {
        select_apps(&self.apps, names)
    }
}

/// Mark `apps` for a test-suite run and attach the requested debugger
pub fn configure_apps(apps: &mut [AppConfig], test_mode: bool, debug: Option<&str>) -> Result<()> {
    let debugger = match debug {
        Some(spec) => Some(DebuggerRegistry::with_builtins()?.configure(spec)?.1),
        None => None,
    };
    for app in apps.iter_mut() {
        app.test_mode |= test_mode;
        if debugger.is_some() {
            app.debugger = debugger.clone();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use briefcase_core::ConnectionMode;

    fn app() -> AppConfig {
        toml::from_str(
            r#"
app_name = "first-app"
version = "0.0.1"
bundle = "com.example"
description = "The first simple app"
sources = ["src/first_app"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_configure_apps() {
        let mut apps = vec![app()];
        configure_apps(&mut apps, false, None).unwrap();
        assert!(!apps[0].test_mode);
        assert!(apps[0].debugger.is_none());

        configure_apps(&mut apps, true, Some("debugpy,9999,client")).unwrap();
        assert!(apps[0].test_mode);
        let debugger = apps[0].debugger.as_ref().unwrap();
        assert_eq!(debugger.debugger, "debugpy");
        assert_eq!(debugger.port, 9999);
        assert_eq!(debugger.mode, ConnectionMode::Client);
    }

    #[test]
    fn test_default_debugger() {
        let mut apps = vec![app()];
        configure_apps(&mut apps, false, Some("")).unwrap();
        let debugger = apps[0].debugger.as_ref().unwrap();
        assert_eq!(debugger.debugger, "pdb");
        assert_eq!(debugger.host, "localhost");
        assert_eq!(debugger.port, 5678);
    }

    #[test]
    fn test_invalid_debugger() {
        let mut apps = vec![app()];
        let err = configure_apps(&mut apps, false, Some("pdb,notaport")).unwrap_err();
        assert_eq!(err.to_string(), "Invalid remote debugger port: notaport");
    }
}
