//! The bundle's path index
//!
//! Every generated bundle carries a `briefcase.toml` whose `[paths]` table
//! says where app code, requirements and the support package go inside that
//! bundle. The index is read once per app and cached for the rest of the
//! command.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use briefcase_core::{AppConfig, BriefcaseError, Result};
use serde::Deserialize;
use toml::{Table, Value};
use tracing::debug;

pub const PATH_INDEX_FILE: &str = "briefcase.toml";

/// The `[paths]` table of a bundle's `briefcase.toml`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BundlePaths {
    #[serde(default)]
    pub app_path: Option<String>,

    #[serde(default)]
    pub app_packages_path: Option<String>,

    #[serde(default)]
    pub app_requirements_path: Option<String>,

    #[serde(default)]
    pub app_requirement_installer_args_path: Option<String>,

    #[serde(default)]
    pub support_path: Option<String>,

    #[serde(default)]
    pub support_revision: Option<String>,

    #[serde(default)]
    pub cleanup_paths: Vec<String>,

    #[serde(default)]
    pub info_plist_path: Option<String>,

    /// A single target, or a table of size (or variant) to target
    #[serde(default)]
    pub icon: Option<Value>,

    #[serde(flatten)]
    pub extra: Table,
}

#[derive(Debug, Deserialize)]
struct PathIndexFile {
    #[serde(default)]
    paths: BundlePaths,
}

/// Reads and caches bundle path indexes
#[derive(Debug, Default)]
pub struct PathIndex {
    cache: RefCell<HashMap<String, Rc<BundlePaths>>>,
}

impl PathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// The path index of `app`'s bundle at `bundle_path`
    pub fn load(&self, app: &AppConfig, bundle_path: &Path) -> Result<Rc<BundlePaths>> {
        if let Some(paths) = self.cache.borrow().get(&app.app_name) {
            return Ok(paths.clone());
        }

        let path = bundle_path.join(PATH_INDEX_FILE);
        debug!(app = %app.app_name, path = %path.display(), "reading path index");
        let content = std::fs::read_to_string(&path).map_err(|e| {
            BriefcaseError::command(format!(
                "Unable to read the path index {} for {}: {}",
                path.display(),
                app.app_name,
                e
            ))
        })?;
        let index: PathIndexFile = toml::from_str(&content).map_err(|e| {
            BriefcaseError::command(format!("Unable to parse the path index {}: {}", path.display(), e))
        })?;

        let paths = Rc::new(index.paths);
        self.cache
            .borrow_mut()
            .insert(app.app_name.clone(), paths.clone());
        Ok(paths)
    }

    /// Forget `app`'s index; the bundle has been regenerated
    pub fn invalidate(&self, app: &AppConfig) {
        self.cache.borrow_mut().remove(&app.app_name);
    }
}

impl BundlePaths {
    /// Resolve a required entry against the bundle
    pub fn required(&self, bundle_path: &Path, key: &str) -> Result<PathBuf> {
        let value = match key {
            "app_path" => self.app_path.as_deref(),
            "app_packages_path" => self.app_packages_path.as_deref(),
            "app_requirements_path" => self.app_requirements_path.as_deref(),
            "support_path" => self.support_path.as_deref(),
            "info_plist_path" => self.info_plist_path.as_deref(),
            other => self.extra.get(other).and_then(Value::as_str),
        };
        value.map(|value| bundle_path.join(value)).ok_or_else(|| {
            BriefcaseError::command(format!(
                "Application path index file does not define `{}`",
                key
            ))
        })
    }

    pub fn app_path(&self, bundle_path: &Path) -> Result<PathBuf> {
        self.required(bundle_path, "app_path")
    }

    fn optional(bundle_path: &Path, value: &Option<String>) -> Option<PathBuf> {
        value.as_deref().map(|value| bundle_path.join(value))
    }

    pub fn app_packages_path(&self, bundle_path: &Path) -> Option<PathBuf> {
        Self::optional(bundle_path, &self.app_packages_path)
    }

    pub fn app_requirements_path(&self, bundle_path: &Path) -> Option<PathBuf> {
        Self::optional(bundle_path, &self.app_requirements_path)
    }

    pub fn app_requirement_installer_args_path(&self, bundle_path: &Path) -> Option<PathBuf> {
        Self::optional(bundle_path, &self.app_requirement_installer_args_path)
    }

    pub fn support_path(&self, bundle_path: &Path) -> Option<PathBuf> {
        Self::optional(bundle_path, &self.support_path)
    }

    /// Icon targets as `(variant, size, path)`; a plain string target has
    /// neither variant nor size
    pub fn icon_targets(&self) -> Vec<(Option<String>, Option<String>, String)> {
        let mut targets = Vec::new();
        match &self.icon {
            Some(Value::String(target)) => targets.push((None, None, target.clone())),
            Some(Value::Table(entries)) => {
                for (key, value) in entries {
                    match value {
                        Value::String(target) => targets.push((None, Some(key.clone()), target.clone())),
                        Value::Table(sizes) => {
                            for (size, target) in sizes {
                                if let Some(target) = target.as_str() {
                                    targets.push((Some(key.clone()), Some(size.clone()), target.to_string()));
                                }
                            }
                        }
                        _ => debug!(icon = %key, "ignoring malformed icon entry"),
                    }
                }
            }
            _ => {}
        }
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn app() -> AppConfig {
        toml::from_str(
            r#"
app_name = "first-app"
version = "0.0.1"
bundle = "com.example"
description = "The first app"
sources = ["src/first_app"]
"#,
        )
        .unwrap()
    }

    const INDEX: &str = r#"
[paths]
app_path = "src/app"
app_packages_path = "src/app_packages"
support_path = "support"
support_revision = "3"
cleanup_paths = ["src/**/*.exe"]
entitlements_path = "Entitlements.plist"

[paths.icon]
16 = "icons/16.png"
32 = "icons/32.png"
"#;

    #[test]
    fn test_load_and_cache() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(PATH_INDEX_FILE), INDEX).unwrap();
        let index = PathIndex::new();
        let paths = index.load(&app(), dir.path()).unwrap();

        assert_eq!(paths.app_path(dir.path()).unwrap(), dir.path().join("src/app"));
        assert_eq!(
            paths.app_packages_path(dir.path()),
            Some(dir.path().join("src/app_packages"))
        );
        assert_eq!(paths.app_requirements_path(dir.path()), None);
        assert_eq!(paths.support_revision.as_deref(), Some("3"));
        assert_eq!(paths.cleanup_paths, vec!["src/**/*.exe"]);
        assert_eq!(
            paths.required(dir.path(), "entitlements_path").unwrap(),
            dir.path().join("Entitlements.plist")
        );

        // A rewritten index isn't seen until the cache is invalidated
        std::fs::write(dir.path().join(PATH_INDEX_FILE), "[paths]\napp_path = \"other\"\n").unwrap();
        let cached = index.load(&app(), dir.path()).unwrap();
        assert!(Rc::ptr_eq(&paths, &cached));

        index.invalidate(&app());
        let fresh = index.load(&app(), dir.path()).unwrap();
        assert_eq!(fresh.app_path(dir.path()).unwrap(), dir.path().join("other"));
    }

    #[test]
    fn test_missing_entry() {
        let paths = BundlePaths::default();
        let err = paths.app_path(Path::new("/bundle")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Application path index file does not define `app_path`"
        );
    }

    #[test]
    fn test_missing_index() {
        let dir = TempDir::new().unwrap();
        let err = PathIndex::new().load(&app(), dir.path()).unwrap_err();
        assert!(err.to_string().starts_with("Unable to read the path index"));
    }

    #[test]
    fn test_icon_targets() {
        let paths: PathIndexFile = toml::from_str(INDEX).unwrap();
        assert_eq!(
            paths.paths.icon_targets(),
            vec![
                (None, Some("16".to_string()), "icons/16.png".to_string()),
                (None, Some("32".to_string()), "icons/32.png".to_string()),
            ]
        );

        let paths: PathIndexFile = toml::from_str(
            "[paths]\nicon = \"icon.ico\"\n[paths.extra_icons]\n",
        )
        .unwrap();
        assert_eq!(
            paths.paths.icon_targets(),
            vec![(None, None, "icon.ico".to_string())]
        );

        let paths: PathIndexFile = toml::from_str(
            "[paths.icon.round]\n48 = \"round-48.png\"\n",
        )
        .unwrap();
        assert_eq!(
            paths.paths.icon_targets(),
            vec![(Some("round".to_string()), Some("48".to_string()), "round-48.png".to_string())]
        );
    }
}
