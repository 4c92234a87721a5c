//! Upgrade command - list or upgrade the tools briefcase manages

use clap::Args;
use tracing::info;

use briefcase_platforms::UpgradeCommand as Upgrade;

use crate::cli::Session;

/// Upgrade the tools briefcase manages
#[derive(Debug, Args)]
pub struct UpgradeCommand {
    /// Tools to upgrade (default: every managed tool)
    pub tools: Vec<String>,

    /// List the managed tools without upgrading them
    #[arg(short, long)]
    pub list: bool,
}

impl UpgradeCommand {
    pub fn execute(&self, session: &Session<'_>) -> anyhow::Result<()> {
        info!(tools = ?self.tools, list = self.list, "executing upgrade command");
        let tools = session.tool_cache();
        Upgrade::new(&tools).run(&self.tools, self.list)?;
        Ok(())
    }
}
