//! Project configuration loading

use std::path::Path;

use toml::{Table, Value};
use tracing::{debug, info};

use crate::error::{BriefcaseError, Result};

use super::merge::{merge_config, merge_pep621_config};
use super::overrides::apply_config_overrides;
use super::types::{AppConfig, GlobalConfig};
use super::validation::{validate_app, validate_global_version};

/// Keys every app must define after layering
const REQUIRED_APP_KEYS: &[&str] = &["bundle", "description", "sources", "version"];

/// The platform and output format being configured, plus the names of all
/// known platforms and formats (whose tables are stripped during layering)
#[derive(Debug, Clone, Copy)]
pub struct ConfigTarget<'a> {
    pub platform: &'a str,
    pub output_format: &'a str,
    pub all_platforms: &'a [&'a str],
    pub all_formats: &'a [&'a str],
}

/// Global settings and the ordered app configurations of a project
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub global: GlobalConfig,
    pub apps: Vec<AppConfig>,
}

fn take_table(table: &mut Table, key: &str) -> Table {
    match table.remove(key) {
        Some(Value::Table(inner)) => inner,
        _ => Table::new(),
    }
}

/// Parse `pyproject.toml` content into the global table and one fully
/// layered table per app, in declared order.
///
/// Layering is global, then app, then `<platform>`, then `<platform>.<format>`.
pub fn parse_config(content: &str, target: ConfigTarget<'_>) -> Result<(Table, Vec<(String, Table)>)> {
    let pyproject: Table = toml::from_str(content)
        .map_err(|e| BriefcaseError::config(format!("Invalid pyproject.toml: {}", e)))?;

    let mut global = pyproject
        .get("tool")
        .and_then(|t| t.as_table())
        .and_then(|t| t.get("briefcase"))
        .and_then(|b| b.as_table())
        .cloned()
        .ok_or_else(|| BriefcaseError::config("No tool.briefcase section in pyproject.toml"))?;

    if let Some(project) = pyproject.get("project").and_then(|p| p.as_table()) {
        merge_pep621_config(&mut global, project);
    }

    let apps = match global.remove("app") {
        Some(Value::Table(apps)) if !apps.is_empty() => apps,
        _ => {
            return Err(BriefcaseError::config(
                "No Briefcase apps defined in pyproject.toml",
            ))
        }
    };

    let mut app_configs = Vec::new();
    for (app_name, app_data) in apps {
        let Value::Table(app_data) = app_data else {
            return Err(BriefcaseError::config(format!(
                "Configuration for '{}' must be a table",
                app_name
            )));
        };

        let mut config = global.clone();
        config.insert("app_name".to_string(), Value::String(app_name.clone()));
        merge_config(&mut config, &app_data);

        let mut platform_data = take_table(&mut config, target.platform);
        for platform in target.all_platforms {
            config.remove(*platform);
        }

        let format_data = take_table(&mut platform_data, target.output_format);
        for format in target.all_formats {
            platform_data.remove(*format);
        }

        merge_config(&mut config, &platform_data);
        merge_config(&mut config, &format_data);

        debug!(app = %app_name, platform = target.platform, format = target.output_format, "layered app configuration");
        app_configs.push((app_name, config));
    }

    Ok((global, app_configs))
}

/// Turn a layered table into a validated [`AppConfig`]
pub fn create_app_config(app_name: &str, config: Table) -> Result<AppConfig> {
    let missing: Vec<String> = REQUIRED_APP_KEYS
        .iter()
        .filter(|key| !config.contains_key(**key))
        .map(|key| format!("'{}'", key))
        .collect();
    if !missing.is_empty() {
        return Err(BriefcaseError::config(format!(
            "Configuration for '{}' is incomplete (missing {})",
            app_name,
            missing.join(", ")
        )));
    }

    let app: AppConfig = Value::Table(config).try_into().map_err(|e| {
        BriefcaseError::config(format!("Configuration for '{}' is invalid: {}", app_name, e))
    })?;
    validate_app(&app)?;
    Ok(app)
}

/// Turn the global table into a [`GlobalConfig`]
pub fn create_global_config(config: Table) -> Result<GlobalConfig> {
    if !config.contains_key("project_name") {
        return Err(BriefcaseError::config(
            "Global configuration is incomplete (missing 'project_name')",
        ));
    }
    let global: GlobalConfig = Value::Table(config)
        .try_into()
        .map_err(|e| BriefcaseError::config(format!("Global configuration is invalid: {}", e)))?;
    validate_global_version(global.version.as_deref())?;
    Ok(global)
}

/// Load, layer, override and validate a project's configuration
pub fn load_project(path: &Path, target: ConfigTarget<'_>, overrides: &Table) -> Result<ProjectConfig> {
    info!(path = %path.display(), "loading project configuration");

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(BriefcaseError::config(
                "Configuration file not found. Did you run Briefcase in a project directory \
                 that contains pyproject.toml?",
            ))
        }
        Err(e) => return Err(e.into()),
    };

    let (global, app_tables) = parse_config(&content, target)?;
    let global = create_global_config(global)?;

    let mut apps = Vec::with_capacity(app_tables.len());
    for (app_name, mut table) in app_tables {
        apply_config_overrides(&mut table, overrides);
        apps.push(create_app_config(&app_name, table)?);
    }

    debug!(apps = apps.len(), "project configuration loaded");
    Ok(ProjectConfig { global, apps })
}
