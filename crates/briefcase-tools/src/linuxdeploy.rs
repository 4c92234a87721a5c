//! linuxdeploy, the AppImage builder
//!
//! linuxdeploy only runs on Linux, but it can be verified (downloaded and
//! made executable) on macOS so that builds can use it inside Docker.

use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use briefcase_core::{BriefcaseError, Result};
use tracing::debug;

use crate::cache::ToolCache;
use crate::file::File;
use crate::tool::{ensure_installed, remove_install, ManagedTool, Tool, VerifyOptions};

const ELF_HEADER_IDENT: &[u8] = b"\x7fELF";
const ELF_PATCH_OFFSET: u64 = 0x08;
/// AppImage magic ("AI", type 2) stored in the ELF padding bytes
const ELF_PATCH_ORIGINAL_BYTES: &[u8] = b"AI\x02";
const ELF_PATCH_PATCHED_BYTES: &[u8] = b"\x00\x00\x00";

/// The linuxdeploy name for a host architecture
pub fn appimage_arch(host_arch: &str) -> Result<&'static str> {
    match host_arch {
        "x86_64" => Ok("x86_64"),
        "i686" => Ok("i386"),
        other => Err(BriefcaseError::command(format!(
            "Linux AppImages cannot be built on {}.",
            other
        ))),
    }
}

#[derive(Debug)]
pub struct LinuxDeploy {
    file_name: String,
}

impl LinuxDeploy {
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_path(&self, tools: &ToolCache) -> PathBuf {
        tools.base_path().join(&self.file_name)
    }

    pub fn download_url(&self) -> String {
        format!(
            "https://github.com/linuxdeploy/linuxdeploy/releases/download/continuous/{}",
            self.file_name
        )
    }

    /// Make the AppImage executable, and strip the AppImage magic from its
    /// ELF header so binfmt handlers such as AppImageLauncher leave it alone
    fn prepare_executable(&self, tools: &ToolCache) -> Result<()> {
        let path = self.file_path(tools);
        let bar = tools.console.wait_bar(format!("Installing {}", self.file_name));
        set_executable(&path)?;
        if is_elf_file(&path)? {
            patch_elf_header(tools, &path, &self.file_name)?;
        }
        bar.done();
        Ok(())
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

fn is_elf_file(path: &Path) -> std::io::Result<bool> {
    let mut header = [0u8; 4];
    let mut file = fs::File::open(path)?;
    match file.read_exact(&mut header) {
        Ok(()) => Ok(header == ELF_HEADER_IDENT),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn patch_elf_header(tools: &ToolCache, path: &Path, file_name: &str) -> Result<()> {
    let mut file = fs::OpenOptions::new().read(true).write(true).open(path)?;
    let mut ident = [0u8; 3];
    file.seek(SeekFrom::Start(ELF_PATCH_OFFSET))?;
    file.read_exact(&mut ident)?;

    if ident == ELF_PATCH_ORIGINAL_BYTES {
        file.seek(SeekFrom::Start(ELF_PATCH_OFFSET))?;
        file.write_all(ELF_PATCH_PATCHED_BYTES)?;
        file.flush()?;
        tools.console.info(format!("Patched ELF header for {}.", file_name));
        Ok(())
    } else if ident == ELF_PATCH_PATCHED_BYTES {
        tools
            .console
            .info(format!("ELF header for {} is already patched.", file_name));
        Ok(())
    } else {
        Err(BriefcaseError::CorruptTool {
            tool: LinuxDeploy::NAME.to_string(),
        })
    }
}

impl Tool for LinuxDeploy {
    const NAME: &'static str = "linuxdeploy";
    const FULL_NAME: &'static str = "linuxdeploy";

    fn supported_host_os() -> &'static [&'static str] {
        &["Darwin", "Linux"]
    }

    fn verify_install(tools: &ToolCache, options: VerifyOptions) -> Result<Self> {
        let arch = appimage_arch(&tools.host_arch)?;
        let tool = Self {
            file_name: format!("linuxdeploy-{}.AppImage", arch),
        };
        if !tool.exists(tools) && options.install {
            tools
                .console
                .prefixed(Self::NAME, "linuxdeploy was not found; downloading and installing...");
        }
        ensure_installed(tools, &tool, options)?;
        debug!(path = %tool.file_path(tools).display(), "using linuxdeploy");
        Ok(tool)
    }

    fn managed_install(&self, _tools: &ToolCache) -> bool {
        true
    }
}

impl ManagedTool for LinuxDeploy {
    fn exists(&self, tools: &ToolCache) -> bool {
        self.file_path(tools).is_file()
    }

    fn install(&self, tools: &ToolCache) -> Result<()> {
        let file = File::verify(tools)?;
        file.download(tools, &self.download_url(), tools.base_path(), Some(Self::FULL_NAME))?;
        self.prepare_executable(tools)
    }

    fn uninstall(&self, tools: &ToolCache) -> Result<()> {
        let bar = tools
            .console
            .wait_bar(format!("Removing old {} install", Self::FULL_NAME));
        remove_install(&self.file_path(tools), Self::FULL_NAME)?;
        bar.done();
        Ok(())
    }
}
