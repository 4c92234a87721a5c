//! Output formats
//!
//! A [`Format`] is one way of packaging an app for a platform (an AppImage
//! for Linux, an Xcode project for iOS). The lifecycle commands own the
//! sequencing of every phase; a format only supplies the narrow hooks that
//! differ between backends: where things live, which tools are needed and
//! in what order, and how to build, run and package the bundle.

use std::path::PathBuf;
use std::rc::Rc;

use briefcase_core::{AppConfig, BriefcaseError, Result};
use briefcase_tools::tool::ALL_HOSTS;
use briefcase_tools::{AppContext, ToolId};
use serde_json::{Map, Value};

use crate::command::CommandContext;

/// A step in an app's packaging lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Create,
    Update,
    Build,
    Run,
    Package,
    Publish,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Create,
        Phase::Update,
        Phase::Build,
        Phase::Run,
        Phase::Package,
        Phase::Publish,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Build => "build",
            Self::Run => "run",
            Self::Package => "package",
            Self::Publish => "publish",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tools every format needs to create and populate a bundle
pub const BASE_TOOLS: &[ToolId] = &[ToolId::Git, ToolId::File, ToolId::Python];

/// Hook set implemented by each platform/format combination
pub trait Format: Send + Sync {
    /// Platform name as used on the command line (`macOS`, `linux`, ...)
    fn platform(&self) -> &'static str;

    fn output_format(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Host operating systems this format can be used on
    fn supported_host_os(&self) -> &'static [&'static str] {
        ALL_HOSTS
    }

    fn supported_host_os_reason(&self, host_os: &str) -> String {
        format!(
            "The {} {} format is not supported on {}.",
            self.platform(),
            self.output_format(),
            host_os
        )
    }

    /// Phases this format implements
    fn phases(&self) -> &'static [Phase] {
        &Phase::ALL
    }

    fn supports_phase(&self, phase: Phase) -> bool {
        self.phases().contains(&phase)
    }

    /// Tools verified before `phase` runs, in verification order
    fn tool_order(&self, phase: Phase) -> Vec<ToolId> {
        let mut order = BASE_TOOLS.to_vec();
        order.extend(self.platform_tools(phase));
        order
    }

    /// Format-specific tools, verified after the base tools by default
    fn platform_tools(&self, _phase: Phase) -> Vec<ToolId> {
        Vec::new()
    }

    /// Verify the tools `phase` needs. Formats with host-specific checks
    /// override this and call [`verify_tool_order`] themselves.
    fn verify_tools(&self, ctx: &CommandContext, phase: Phase) -> Result<()> {
        verify_tool_order(ctx, &self.tool_order(phase))
    }

    /// Location of the built artifact that `run` launches
    fn binary_path(&self, ctx: &CommandContext, app: &AppConfig) -> PathBuf;

    /// Location of the packaged, distributable artifact
    fn distribution_path(&self, ctx: &CommandContext, app: &AppConfig) -> PathBuf;

    fn template_url(&self) -> String {
        format!(
            "https://github.com/beeware/briefcase-{}-{}-template.git",
            self.platform(),
            self.output_format()
        )
    }

    /// Extra values passed to the template
    fn template_context(&self, _ctx: &CommandContext, _app: &AppConfig) -> Result<Map<String, Value>> {
        Ok(Map::new())
    }

    /// URL of the standard support package for this format
    fn support_package_url(&self, _ctx: &CommandContext, python_tag: &str, revision: &str) -> String {
        format!(
            "https://briefcase-support.s3.amazonaws.com/python/{tag}/{platform}/Python-{tag}-{platform}-support.b{revision}.tar.gz",
            tag = python_tag,
            platform = self.platform(),
            revision = revision,
        )
    }

    /// Execution context for commands run on the app's behalf, when it
    /// differs from the host (a Docker container, a Flatpak sandbox)
    fn app_context(&self, _ctx: &CommandContext, _app: &AppConfig) -> Result<Option<Rc<dyn AppContext>>> {
        Ok(None)
    }

    /// App-specific checks made before an app is built or run
    fn verify_app(&self, _ctx: &CommandContext, _app: &AppConfig) -> Result<()> {
        Ok(())
    }

    fn build_app(&self, ctx: &CommandContext, app: &AppConfig) -> Result<()>;

    /// Launch the built app, streaming its output
    fn run_app(&self, _ctx: &CommandContext, _app: &AppConfig, _passthrough: &[String]) -> Result<()> {
        Err(self.unsupported(Phase::Run))
    }

    fn package_app(&self, _ctx: &CommandContext, _app: &AppConfig) -> Result<()> {
        Err(self.unsupported(Phase::Package))
    }

    fn unsupported(&self, phase: Phase) -> BriefcaseError {
        BriefcaseError::UnsupportedCommand {
            platform: self.platform().to_string(),
            output_format: self.output_format().to_string(),
            command: phase.to_string(),
        }
    }
}

/// Verify `order` left to right, stopping at the first failure
pub fn verify_tool_order(ctx: &CommandContext, order: &[ToolId]) -> Result<()> {
    for tool in order {
        tool.verify(&ctx.tools)?;
    }
    Ok(())
}
