//! Command-line configuration overrides (`-C key=value`)

use toml::{Table, Value};

use crate::error::{BriefcaseError, Result};

fn unparsable(item: &str) -> BriefcaseError {
    BriefcaseError::config(format!("Unable to parse configuration override {}", item))
}

/// Parse `key=value` overrides; each value is interpreted as TOML.
///
/// One level of dotted nesting is allowed (`linux.runtime="x"`); the app name
/// cannot be overridden.
pub fn parse_config_overrides(overrides: &[String]) -> Result<Table> {
    let mut result = Table::new();

    for item in overrides {
        let (key, _) = item.split_once('=').ok_or_else(|| unparsable(item))?;
        let key = key.trim();
        if key.split('.').count() > 2 {
            return Err(BriefcaseError::config(
                "Can't override multi-level configuration keys.",
            ));
        }
        if key == "app_name" {
            return Err(BriefcaseError::config("The app name cannot be overridden."));
        }

        let parsed: Table = toml::from_str(item).map_err(|_| unparsable(item))?;
        apply_config_overrides(&mut result, &parsed);
    }

    Ok(result)
}

/// Apply parsed overrides to a configuration table.
///
/// Nested tables are merged one level deep; everything else is replaced.
pub fn apply_config_overrides(config: &mut Table, overrides: &Table) {
    for (key, value) in overrides {
        match (config.get_mut(key), value) {
            (Some(Value::Table(existing)), Value::Table(nested)) => {
                for (k, v) in nested {
                    existing.insert(k.clone(), v.clone());
                }
            }
            _ => {
                config.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(items: &[&str]) -> Result<Table> {
        let items: Vec<String> = items.iter().map(|s| s.to_string()).collect();
        parse_config_overrides(&items)
    }

    #[test]
    fn test_simple_values() {
        let parsed = overrides(&["version='2.0'", "console_app=true", "requires=['a', 'b']"])
            .unwrap();
        assert_eq!(parsed["version"].as_str(), Some("2.0"));
        assert_eq!(parsed["console_app"].as_bool(), Some(true));
        assert_eq!(parsed["requires"].as_array().map(|a| a.len()), Some(2));
    }

    #[test]
    fn test_single_level_nesting() {
        let parsed = overrides(&["linux.runtime='24.08'", "linux.sdk='org.freedesktop.Sdk'"])
            .unwrap();
        let linux = parsed["linux"].as_table().unwrap();
        assert_eq!(linux["runtime"].as_str(), Some("24.08"));
        assert_eq!(linux["sdk"].as_str(), Some("org.freedesktop.Sdk"));
    }

    #[test]
    fn test_multi_level_rejected() {
        let err = overrides(&["linux.flatpak.runtime='x'"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Briefcase configuration error: Can't override multi-level configuration keys."
        );
    }

    #[test]
    fn test_app_name_rejected() {
        let err = overrides(&["app_name='other'"]).unwrap_err();
        assert!(err.to_string().contains("The app name cannot be overridden."));
    }

    #[test]
    fn test_unparsable() {
        for item in ["no-equals", "version=unquoted string"] {
            let err = overrides(&[item]).unwrap_err();
            assert_eq!(
                err.to_string(),
                format!("Briefcase configuration error: Unable to parse configuration override {}", item)
            );
        }
    }

    #[test]
    fn test_apply_merges_nested_tables() {
        let mut config: Table = toml::from_str(
            r#"
            version = "1.0"
            [linux]
            runtime = "23.08"
            sdk = "org.freedesktop.Sdk"
            "#,
        )
        .unwrap();
        let parsed = overrides(&["version='2.0'", "linux.runtime='24.08'"]).unwrap();
        apply_config_overrides(&mut config, &parsed);

        assert_eq!(config["version"].as_str(), Some("2.0"));
        let linux = config["linux"].as_table().unwrap();
        assert_eq!(linux["runtime"].as_str(), Some("24.08"));
        assert_eq!(linux["sdk"].as_str(), Some("org.freedesktop.Sdk"));
    }
}
