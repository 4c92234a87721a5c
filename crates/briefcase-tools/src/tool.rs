//! The tool verification protocol
//!
//! A [`Tool`] is an external program or SDK briefcase depends on. Verifying a
//! tool checks that the host supports it, confirms (and for a
//! [`ManagedTool`], optionally installs) the install, and caches the verified
//! instance on the [`ToolCache`] so later commands reuse it.

use std::path::Path;
use std::rc::Rc;

use briefcase_core::{BriefcaseError, Result};
use tracing::debug;

use crate::cache::ToolCache;
use crate::docker::Docker;
use crate::file::File;
use crate::flatpak::Flatpak;
use crate::git::Git;
use crate::linuxdeploy::LinuxDeploy;
use crate::python::Python;
use crate::wix::WiX;
use crate::xcode::{Xcode, XcodeCliTools};

pub const ALL_HOSTS: &[&str] = &["Darwin", "Linux", "Windows"];

/// Parse a dotted version that may have fewer than three components
/// (`20.10`, `1.14.4`, `15`) into a comparable semver version
pub fn parse_loose_version(text: &str) -> Option<semver::Version> {
    let mut parts: Vec<u64> = text
        .trim()
        .split('.')
        .map(|part| part.parse().ok())
        .collect::<Option<_>>()?;
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    parts.resize(3, 0);
    Some(semver::Version::new(parts[0], parts[1], parts[2]))
}

/// Options controlling verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Install a managed tool that is missing
    pub install: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self { install: true }
    }
}

impl VerifyOptions {
    pub fn no_install() -> Self {
        Self { install: false }
    }
}

pub trait Tool: Sized + 'static {
    /// Short identifier; also the key in the tool cache
    const NAME: &'static str;
    /// Human-readable name used in messages
    const FULL_NAME: &'static str;

    fn supported_host_os() -> &'static [&'static str] {
        ALL_HOSTS
    }

    /// Confirm the install and build an instance of the tool
    fn verify_install(tools: &ToolCache, options: VerifyOptions) -> Result<Self>;

    /// Whether briefcase owns this install
    fn managed_install(&self, _tools: &ToolCache) -> bool {
        false
    }

    fn verify(tools: &ToolCache) -> Result<Rc<Self>> {
        Self::verify_with(tools, VerifyOptions::default())
    }

    /// Verify the tool, returning the cached instance when there is one
    fn verify_with(tools: &ToolCache, options: VerifyOptions) -> Result<Rc<Self>> {
        if let Some(tool) = tools.lookup::<Self>() {
            return Ok(tool);
        }
        verify_host::<Self>(tools)?;
        debug!(tool = Self::NAME, install = options.install, "verifying tool");
        let tool = Self::verify_install(tools, options)?;
        Ok(tools.attach(tool))
    }
}

/// Fail with `UnsupportedHost` if `T` can't run on this host
pub fn verify_host<T: Tool>(tools: &ToolCache) -> Result<()> {
    if T::supported_host_os().contains(&tools.host_os.as_str()) {
        Ok(())
    } else {
        Err(BriefcaseError::UnsupportedHost {
            name: T::NAME.to_string(),
            host_os: tools.host_os.clone(),
        })
    }
}

/// A tool briefcase can install, upgrade and remove itself
pub trait ManagedTool: Tool {
    fn exists(&self, tools: &ToolCache) -> bool;
    fn install(&self, tools: &ToolCache) -> Result<()>;
    fn uninstall(&self, tools: &ToolCache) -> Result<()>;

    /// Replace the install with the latest version
    fn upgrade(&self, tools: &ToolCache) -> Result<()> {
        debug!(tool = Self::NAME, "upgrading tool");
        if !self.managed_install(tools) {
            return Err(BriefcaseError::NonManagedTool {
                tool: Self::FULL_NAME.to_string(),
            });
        }
        if !self.exists(tools) {
            return Err(BriefcaseError::missing_tool(Self::FULL_NAME));
        }
        self.uninstall(tools)?;
        self.install(tools)
    }
}

/// Install `tool` if it is missing and installing is allowed
pub fn ensure_installed<T: ManagedTool>(tools: &ToolCache, tool: &T, options: VerifyOptions) -> Result<()> {
    if tool.exists(tools) {
        return Ok(());
    }
    if !options.install {
        return Err(BriefcaseError::missing_tool(T::FULL_NAME));
    }
    tool.install(tools)
}

/// Delete a managed install directory or file
pub fn remove_install(path: &Path, full_name: &str) -> Result<()> {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => Err(BriefcaseError::command(
            format!(
                "Permission denied when trying to remove the existing {} install.\n\
                 Ensure no processes are using {} and try again.",
                full_name, full_name
            ),
        )),
        Err(e) => Err(e.into()),
    }
}

/// The tools a format can ask for by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolId {
    File,
    Git,
    Python,
    Docker,
    Flatpak,
    Xcode,
    XcodeCli,
    LinuxDeploy,
    Wix,
}

pub const BUILTIN_TOOLS: &[ToolId] = &[
    ToolId::File,
    ToolId::Git,
    ToolId::Python,
    ToolId::Docker,
    ToolId::Flatpak,
    ToolId::Xcode,
    ToolId::XcodeCli,
    ToolId::LinuxDeploy,
    ToolId::Wix,
];

impl ToolId {
    pub fn name(self) -> &'static str {
        match self {
            Self::File => File::NAME,
            Self::Git => Git::NAME,
            Self::Python => Python::NAME,
            Self::Docker => Docker::NAME,
            Self::Flatpak => Flatpak::NAME,
            Self::Xcode => Xcode::NAME,
            Self::XcodeCli => XcodeCliTools::NAME,
            Self::LinuxDeploy => LinuxDeploy::NAME,
            Self::Wix => WiX::NAME,
        }
    }

    pub fn verify(self, tools: &ToolCache) -> Result<()> {
        match self {
            Self::File => File::verify(tools).map(drop),
            Self::Git => Git::verify(tools).map(drop),
            Self::Python => Python::verify(tools).map(drop),
            Self::Docker => Docker::verify(tools).map(drop),
            Self::Flatpak => Flatpak::verify(tools).map(drop),
            Self::Xcode => Xcode::verify(tools).map(drop),
            Self::XcodeCli => XcodeCliTools::verify(tools).map(drop),
            Self::LinuxDeploy => LinuxDeploy::verify(tools).map(drop),
            Self::Wix => WiX::verify(tools).map(drop),
        }
    }
}

impl std::fmt::Display for ToolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An installed managed tool, ready to be upgraded
pub struct ManagedToolHandle {
    pub name: &'static str,
    pub full_name: &'static str,
    upgrade: Box<dyn Fn(&ToolCache) -> Result<()>>,
}

impl ManagedToolHandle {
    fn new<T: ManagedTool>(tool: Rc<T>) -> Self {
        Self {
            name: T::NAME,
            full_name: T::FULL_NAME,
            upgrade: Box::new(move |tools| tool.upgrade(tools)),
        }
    }

    pub fn upgrade(&self, tools: &ToolCache) -> Result<()> {
        (self.upgrade)(tools)
    }
}

impl std::fmt::Debug for ManagedToolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedToolHandle")
            .field("name", &self.name)
            .finish()
    }
}

fn probe<T: ManagedTool>(tools: &ToolCache, found: &mut Vec<ManagedToolHandle>) {
    match T::verify_with(tools, VerifyOptions::no_install()) {
        Ok(tool) if tool.managed_install(tools) => found.push(ManagedToolHandle::new(tool)),
        Ok(_) => debug!(tool = T::NAME, "tool install is not managed"),
        Err(e) => debug!(tool = T::NAME, error = %e, "managed tool not available"),
    }
}

/// Managed tools that are present and owned by briefcase, sorted by name
pub fn installed_managed_tools(tools: &ToolCache) -> Vec<ManagedToolHandle> {
    let mut found = Vec::new();
    probe::<LinuxDeploy>(tools, &mut found);
    probe::<WiX>(tools, &mut found);
    found.sort_by_key(|handle| handle.name);
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fake_tool_cache;
    use std::cell::Cell;
    use tempfile::TempDir;

    struct DarwinOnly;

    impl Tool for DarwinOnly {
        const NAME: &'static str = "darwin-only";
        const FULL_NAME: &'static str = "Darwin Only";

        fn supported_host_os() -> &'static [&'static str] {
            &["Darwin"]
        }

        fn verify_install(_tools: &ToolCache, _options: VerifyOptions) -> Result<Self> {
            Ok(DarwinOnly)
        }
    }

    struct Gadget {
        managed: bool,
        present: Cell<bool>,
        installs: Cell<u32>,
    }

    impl Tool for Gadget {
        const NAME: &'static str = "gadget";
        const FULL_NAME: &'static str = "Gadget";

        fn verify_install(_tools: &ToolCache, _options: VerifyOptions) -> Result<Self> {
            Ok(Gadget {
                managed: true,
                present: Cell::new(true),
                installs: Cell::new(0),
            })
        }

        fn managed_install(&self, _tools: &ToolCache) -> bool {
            self.managed
        }
    }

    impl ManagedTool for Gadget {
        fn exists(&self, _tools: &ToolCache) -> bool {
            self.present.get()
        }

        fn install(&self, _tools: &ToolCache) -> Result<()> {
            self.present.set(true);
            self.installs.set(self.installs.get() + 1);
            Ok(())
        }

        fn uninstall(&self, _tools: &ToolCache) -> Result<()> {
            self.present.set(false);
            Ok(())
        }
    }

    fn gadget(managed: bool, present: bool) -> Gadget {
        Gadget {
            managed,
            present: Cell::new(present),
            installs: Cell::new(0),
        }
    }

    #[test]
    fn test_unsupported_host() {
        let dir = TempDir::new().unwrap();
        let (tools, _) = fake_tool_cache(dir.path(), "Linux");
        let err = DarwinOnly::verify(&tools).err().unwrap();
        assert_eq!(err.to_string(), "darwin-only is not supported on Linux");
        assert!(!tools.is_verified("darwin-only"));
    }

    #[test]
    fn test_verify_caches_instance() {
        let dir = TempDir::new().unwrap();
        let (tools, _) = fake_tool_cache(dir.path(), "Linux");
        let first = Gadget::verify(&tools).unwrap();
        first.installs.set(7);
        let second = Gadget::verify(&tools).unwrap();
        assert_eq!(second.installs.get(), 7);
    }

    #[test]
    fn test_upgrade() {
        let dir = TempDir::new().unwrap();
        let (tools, _) = fake_tool_cache(dir.path(), "Linux");

        let tool = gadget(true, true);
        tool.upgrade(&tools).unwrap();
        assert_eq!(tool.installs.get(), 1);
        assert!(tool.present.get());

        let err = gadget(true, false).upgrade(&tools).unwrap_err();
        assert_eq!(err.to_string(), "Unable to locate 'Gadget'. Has it been installed?");

        let err = gadget(false, true).upgrade(&tools).unwrap_err();
        assert_eq!(err.to_string(), "'Gadget' is using an install that is user managed.");
    }

    #[test]
    fn test_ensure_installed() {
        let dir = TempDir::new().unwrap();
        let (tools, _) = fake_tool_cache(dir.path(), "Linux");

        let tool = gadget(true, false);
        assert!(ensure_installed(&tools, &tool, VerifyOptions::no_install()).is_err());
        assert_eq!(tool.installs.get(), 0);

        ensure_installed(&tools, &tool, VerifyOptions::default()).unwrap();
        assert_eq!(tool.installs.get(), 1);
    }

    #[test]
    fn test_remove_install() {
        let dir = TempDir::new().unwrap();
        let install = dir.path().join("tool");
        std::fs::create_dir_all(install.join("bin")).unwrap();
        std::fs::write(install.join("bin").join("tool"), "x").unwrap();

        remove_install(&install, "Tool").unwrap();
        assert!(!install.exists());
        remove_install(&install, "Tool").unwrap();
    }

    #[test]
    fn test_parse_loose_version() {
        assert_eq!(parse_loose_version("20.10"), Some(semver::Version::new(20, 10, 0)));
        assert_eq!(parse_loose_version("1.14.4"), Some(semver::Version::new(1, 14, 4)));
        assert_eq!(parse_loose_version("15"), Some(semver::Version::new(15, 0, 0)));
        assert!(parse_loose_version("25.0.2-rc1").is_none());
        assert!(parse_loose_version("").is_none());
        assert!(parse_loose_version("1.2.3.4").is_none());
    }

    #[test]
    fn test_tool_names_are_slugs() {
        for tool in BUILTIN_TOOLS {
            assert!(!tool.name().contains(' '), "{}", tool);
        }
    }
}
