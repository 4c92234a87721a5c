//! Create command - generate app bundles from their templates

use clap::Args;
use tracing::info;

use briefcase_platforms::{run_for_apps, CreateCommand as Create};

use crate::cli::project::Project;
use crate::cli::{Session, TargetArgs};

/// Create a new app bundle for a target platform
#[derive(Debug, Args)]
pub struct CreateCommand {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Name of the app to create; may be repeated (default: all apps)
    #[arg(short, long = "app", value_name = "APP")]
    pub apps: Vec<String>,
}

impl CreateCommand {
    pub fn execute(&self, session: &Session<'_>) -> anyhow::Result<()> {
        info!(apps = ?self.apps, "executing create command");
        let project = Project::load(session, &self.target)?;
        let apps = project.select(&self.apps)?;
        run_for_apps(&Create::new(&project.ctx), &apps)?;
        Ok(())
    }
}
