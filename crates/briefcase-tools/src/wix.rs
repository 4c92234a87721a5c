//! The WiX toolset, used to build Windows MSI installers

use std::path::{Path, PathBuf};

use briefcase_core::{BriefcaseError, Result};
use tracing::debug;

use crate::cache::ToolCache;
use crate::file::File;
use crate::tool::{remove_install, ManagedTool, Tool, VerifyOptions};

pub const WIX_DOWNLOAD_URL: &str =
    "https://github.com/wixtoolset/wix3/releases/download/wix3112rtm/wix311-binaries.zip";

/// Environment variable pointing at a user-managed WiX install
pub const WIX_ENV: &str = "WIX";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiX {
    pub wix_home: PathBuf,
    /// A binaries-only install keeps the executables at the top level; a
    /// full MSI install puts them in `bin/`
    pub bin_install: bool,
}

impl WiX {
    pub fn new(wix_home: impl Into<PathBuf>, bin_install: bool) -> Self {
        Self {
            wix_home: wix_home.into(),
            bin_install,
        }
    }

    fn exe(&self, name: &str) -> PathBuf {
        if self.bin_install {
            self.wix_home.join(name)
        } else {
            self.wix_home.join("bin").join(name)
        }
    }

    pub fn heat_exe(&self) -> PathBuf {
        self.exe("heat.exe")
    }

    pub fn light_exe(&self) -> PathBuf {
        self.exe("light.exe")
    }

    pub fn candle_exe(&self) -> PathBuf {
        self.exe("candle.exe")
    }
}

impl Tool for WiX {
    const NAME: &'static str = "wix";
    const FULL_NAME: &'static str = "WiX";

    fn supported_host_os() -> &'static [&'static str] {
        &["Windows"]
    }

    fn verify_install(tools: &ToolCache, options: VerifyOptions) -> Result<Self> {
        let wix = if let Some(wix_env) = tools.subprocess.env_var(WIX_ENV) {
            tools.console.debug(format!("{}={}", WIX_ENV, wix_env));
            let wix = WiX::new(wix_env, false);
            if !wix.exists(tools) {
                return Err(BriefcaseError::command(format!(
                    "The WIX environment variable:\n\n{}\n\ndoes not point to an install of the WiX Toolset.",
                    wix.wix_home.display()
                )));
            }
            wix
        } else {
            let wix = WiX::new(tools.base_path().join("wix"), true);
            if !wix.exists(tools) {
                if !options.install {
                    return Err(BriefcaseError::missing_tool(Self::FULL_NAME));
                }
                tools.console.prefixed(
                    Self::NAME,
                    "The WiX toolset was not found; downloading and installing...",
                );
                wix.install(tools)?;
            }
            wix
        };
        debug!(wix_home = %wix.wix_home.display(), "using WiX");
        Ok(wix)
    }

    fn managed_install(&self, tools: &ToolCache) -> bool {
        self.wix_home.starts_with(tools.base_path())
    }
}

impl ManagedTool for WiX {
    fn exists(&self, _tools: &ToolCache) -> bool {
        [self.heat_exe(), self.light_exe(), self.candle_exe()]
            .iter()
            .all(|exe| exe.is_file())
    }

    fn install(&self, tools: &ToolCache) -> Result<()> {
        let file = File::verify(tools)?;
        let wix_zip_path = file.download(tools, WIX_DOWNLOAD_URL, tools.base_path(), Some(Self::FULL_NAME))?;

        let bar = tools.console.wait_bar("Installing WiX");
        if let Err(e) = file.unpack_archive(&wix_zip_path, &self.wix_home) {
            debug!(error = %e, "WiX unpack failed");
            return Err(unpack_failure(&wix_zip_path));
        }
        bar.done();

        std::fs::remove_file(&wix_zip_path)?;
        Ok(())
    }

    fn uninstall(&self, tools: &ToolCache) -> Result<()> {
        let bar = tools.console.wait_bar("Removing old WiX install");
        remove_install(&self.wix_home, Self::FULL_NAME)?;
        bar.done();
        Ok(())
    }
}

fn unpack_failure(wix_zip_path: &Path) -> BriefcaseError {
    BriefcaseError::command(format!(
        "Unable to unpack WiX ZIP file. The download may have been\n\
         interrupted or corrupted.\n\n\
         Delete {} and run briefcase again.",
        wix_zip_path.display()
    ))
}
