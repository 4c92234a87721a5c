//! Built-in platforms and output formats

pub mod ios;
pub mod linux;
pub mod macos;
pub mod windows;

use briefcase_core::Result;

use crate::registry::PlatformRegistry;

pub use ios::IosXcode;
pub use linux::{LinuxAppImage, LinuxFlatpak};
pub use macos::MacOsApp;
pub use windows::WindowsApp;

/// Command-line switches that change how built-in formats behave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinOptions {
    /// Build Linux AppImages inside Docker
    pub use_docker: bool,
}

impl Default for BuiltinOptions {
    fn default() -> Self {
        Self { use_docker: true }
    }
}

/// Register every built-in format and each platform's default
pub fn register_all(registry: &mut PlatformRegistry, options: BuiltinOptions) -> Result<()> {
    registry.register(LinuxAppImage::new(options.use_docker))?;
    registry.register(LinuxFlatpak)?;
    registry.set_default("linux", "AppImage")?;

    registry.register(MacOsApp)?;
    registry.set_default("macOS", "app")?;

    registry.register(WindowsApp)?;
    registry.set_default("windows", "app")?;

    registry.register(IosXcode)?;
    registry.set_default("iOS", "Xcode")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_docker_option_reaches_appimage() {
        let registry = PlatformRegistry::with_options(BuiltinOptions { use_docker: false }).unwrap();
        let format = registry.get("linux", "AppImage").unwrap();
        assert!(!format
            .tool_order(crate::format::Phase::Build)
            .contains(&briefcase_tools::ToolId::Docker));

        let registry = PlatformRegistry::with_builtins().unwrap();
        let format = registry.get("linux", "AppImage").unwrap();
        assert!(format
            .tool_order(crate::format::Phase::Build)
            .contains(&briefcase_tools::ToolId::Docker));
    }
}
