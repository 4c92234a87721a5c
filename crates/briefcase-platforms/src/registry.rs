//! Platform and output format registry
//!
//! Formats are registered once at startup from a fixed table of built-ins
//! (see [`crate::platforms::register_all`]). Each (platform, format) pair is
//! unique, and each platform may name one default format.

use std::sync::Arc;

use briefcase_core::{BriefcaseError, Result};
use tracing::{debug, instrument};

use crate::format::Format;
use crate::platforms::BuiltinOptions;

/// Registry of known platforms and their output formats
pub struct PlatformRegistry {
    formats: Vec<Arc<dyn Format>>,
    defaults: Vec<(&'static str, &'static str)>,
}

/// The platform name briefcase uses for a host OS
pub fn host_platform(host_os: &str) -> &'static str {
    match host_os {
        "Darwin" => "macOS",
        "Windows" => "windows",
        _ => "linux",
    }
}

impl PlatformRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            formats: Vec::new(),
            defaults: Vec::new(),
        }
    }

    /// Create a registry holding every built-in format
    pub fn with_builtins() -> Result<Self> {
        Self::with_options(BuiltinOptions::default())
    }

    /// Built-in formats, configured by command-line options
    pub fn with_options(options: BuiltinOptions) -> Result<Self> {
        let mut registry = Self::new();
        crate::platforms::register_all(&mut registry, options)?;
        Ok(registry)
    }

    /// Register a format; a platform can't define the same format twice
    pub fn register<F: Format + 'static>(&mut self, format: F) -> Result<()> {
        let (platform, output_format) = (format.platform(), format.output_format());
        if self.get(platform, output_format).is_some() {
            return Err(BriefcaseError::config(format!(
                "Output format '{}' is registered more than once for {}",
                output_format, platform
            )));
        }
        debug!(platform, output_format, "registering output format");
        self.formats.push(Arc::new(format));
        Ok(())
    }

    /// Make `output_format` the format used when none is requested
    pub fn set_default(&mut self, platform: &'static str, output_format: &'static str) -> Result<()> {
        if self.get(platform, output_format).is_none() {
            return Err(BriefcaseError::config(format!(
                "Default format '{}' for {} is not registered",
                output_format, platform
            )));
        }
        if self.defaults.iter().any(|(p, _)| *p == platform) {
            return Err(BriefcaseError::config(format!(
                "Platform {} has more than one default format",
                platform
            )));
        }
        self.defaults.push((platform, output_format));
        Ok(())
    }

    pub fn get(&self, platform: &str, output_format: &str) -> Option<Arc<dyn Format>> {
        self.formats
            .iter()
            .find(|f| f.platform() == platform && f.output_format() == output_format)
            .cloned()
    }

    /// Platforms in registration order
    pub fn platforms(&self) -> Vec<&'static str> {
        let mut platforms: Vec<&'static str> = Vec::new();
        for format in &self.formats {
            if !platforms.contains(&format.platform()) {
                platforms.push(format.platform());
            }
        }
        platforms
    }

    /// Formats available for `platform`, in registration order
    pub fn formats(&self, platform: &str) -> Vec<&'static str> {
        self.formats
            .iter()
            .filter(|f| f.platform() == platform)
            .map(|f| f.output_format())
            .collect()
    }

    /// Every format name across all platforms, without repeats
    pub fn all_format_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = Vec::new();
        for format in &self.formats {
            if !names.contains(&format.output_format()) {
                names.push(format.output_format());
            }
        }
        names
    }

    pub fn default_format(&self, platform: &str) -> Option<&'static str> {
        self.defaults
            .iter()
            .find(|(p, _)| *p == platform)
            .map(|(_, f)| *f)
    }

    fn check_platform(&self, platform: &str) -> Result<()> {
        let platforms = self.platforms();
        if platforms.contains(&platform) {
            Ok(())
        } else {
            Err(BriefcaseError::InvalidPlatform {
                requested: platform.to_string(),
                choices: platforms.iter().map(|p| p.to_string()).collect(),
            })
        }
    }

    /// Resolve the format to use. The platform defaults to the host's, the
    /// format to the platform's default.
    #[instrument(skip(self))]
    pub fn resolve(
        &self,
        platform: Option<&str>,
        output_format: Option<&str>,
        host_os: &str,
    ) -> Result<Arc<dyn Format>> {
        let platform = platform.unwrap_or_else(|| host_platform(host_os));
        self.check_platform(platform)?;

        let output_format = match output_format {
            Some(output_format) => output_format,
            None => self.default_format(platform).ok_or_else(|| {
                BriefcaseError::command(format!(
                    "{} does not define a default output format; (choose from: {})",
                    platform,
                    self.formats(platform).join(", ")
                ))
            })?,
        };

        self.get(platform, output_format).ok_or_else(|| BriefcaseError::InvalidFormat {
            requested: output_format.to_string(),
            choices: self.formats(platform).iter().map(|f| f.to_string()).collect(),
        })
    }

    /// The `-f/--formats` outcome for `platform`
    pub fn show_formats(&self, platform: Option<&str>, host_os: &str) -> BriefcaseError {
        let platform = platform.unwrap_or_else(|| host_platform(host_os));
        if let Err(e) = self.check_platform(platform) {
            return e;
        }
        BriefcaseError::ShowOutputFormats {
            platform: platform.to_string(),
            default: self.default_format(platform).unwrap_or_default().to_string(),
            choices: self.formats(platform).iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Get all registered formats
    pub fn all(&self) -> &[Arc<dyn Format>] {
        &self.formats
    }
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::tests::DummyFormat;

    #[test]
    fn test_builtins() {
        let registry = PlatformRegistry::with_builtins().unwrap();
        assert_eq!(registry.platforms(), vec!["linux", "macOS", "windows", "iOS"]);
        assert_eq!(registry.formats("linux"), vec!["AppImage", "flatpak"]);
        assert_eq!(registry.default_format("linux"), Some("AppImage"));
        assert_eq!(registry.default_format("macOS"), Some("app"));
        assert_eq!(registry.default_format("windows"), Some("app"));
        assert_eq!(registry.default_format("iOS"), Some("Xcode"));
        assert_eq!(
            registry.all_format_names(),
            vec!["AppImage", "flatpak", "app", "Xcode"]
        );
    }

    #[test]
    fn test_resolve() {
        let registry = PlatformRegistry::with_builtins().unwrap();
        let format = registry.resolve(None, None, "Darwin").unwrap();
        assert_eq!((format.platform(), format.output_format()), ("macOS", "app"));

        let format = registry.resolve(Some("linux"), Some("flatpak"), "Darwin").unwrap();
        assert_eq!(format.output_format(), "flatpak");

        let err = registry.resolve(Some("beos"), None, "Linux").err().unwrap();
        assert_eq!(
            err.to_string(),
            "Invalid platform 'beos'; (choose from: linux, macOS, windows, iOS)"
        );

        let err = registry.resolve(Some("linux"), Some("snap"), "Linux").err().unwrap();
        assert_eq!(
            err.to_string(),
            "Invalid format 'snap'; (choose from: AppImage, flatpak)"
        );
    }

    #[test]
    fn test_show_formats() {
        let registry = PlatformRegistry::with_builtins().unwrap();
        let outcome = registry.show_formats(None, "Linux");
        assert_eq!(outcome.error_code(), 0);
        assert_eq!(
            outcome.to_string(),
            "Available formats for linux: AppImage, flatpak\nDefault format: AppImage"
        );
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut registry = PlatformRegistry::new();
        registry.register(DummyFormat::default()).unwrap();
        let err = registry.register(DummyFormat::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Briefcase configuration error: Output format 'Dummy' is registered more than once for Tester"
        );

        registry.set_default("Tester", "Dummy").unwrap();
        assert!(registry.set_default("Tester", "Dummy").is_err());
        assert!(registry.set_default("Tester", "Other").is_err());
    }

    #[test]
    fn test_no_default_format() {
        let mut registry = PlatformRegistry::new();
        registry.register(DummyFormat::default()).unwrap();
        let err = registry.resolve(Some("Tester"), None, "Linux").err().unwrap();
        assert_eq!(
            err.to_string(),
            "Tester does not define a default output format; (choose from: Dummy)"
        );
    }
}
