//! The host Python interpreter

use std::path::PathBuf;

use briefcase_core::{BriefcaseError, Result};

use crate::cache::ToolCache;
use crate::subprocess::{path_arg, SubprocessOptions};
use crate::tool::{Tool, VerifyOptions};

const VERSION_SCRIPT: &str =
    "import sys; print(f'{sys.version_info.major}.{sys.version_info.minor}')";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Python {
    pub executable: PathBuf,
    /// Major and minor version
    pub version: (u32, u32),
}

fn parse_version(output: &str) -> std::result::Result<(u32, u32), String> {
    let text = output.trim();
    let (major, minor) = text
        .split_once('.')
        .ok_or_else(|| format!("Unexpected Python version {:?}", text))?;
    let major = major
        .parse()
        .map_err(|_| format!("Unexpected Python version {:?}", text))?;
    let minor = minor
        .parse()
        .map_err(|_| format!("Unexpected Python version {:?}", text))?;
    Ok((major, minor))
}

impl Tool for Python {
    const NAME: &'static str = "python";
    const FULL_NAME: &'static str = "Python";

    fn verify_install(tools: &ToolCache, _options: VerifyOptions) -> Result<Self> {
        let executable = tools.host_python.clone();
        let args = vec![path_arg(&executable), "-c".to_string(), VERSION_SCRIPT.to_string()];
        let version = match tools
            .subprocess
            .parse_output(parse_version, &args, &SubprocessOptions::new().quiet())
        {
            Ok(version) => version,
            Err(BriefcaseError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BriefcaseError::command(format!(
                    "Unable to find a Python interpreter at {}.\n\
                     Set BRIEFCASE_PYTHON to the interpreter briefcase should use.",
                    executable.display()
                )))
            }
            Err(e) => return Err(e),
        };
        Ok(Self { executable, version })
    }
}

impl Python {
    /// `major.minor`, as used in support package and site-packages paths
    pub fn version_tag(&self) -> String {
        format!("{}.{}", self.version.0, self.version.1)
    }
}
