//! Update command - refresh parts of existing app bundles

use clap::Args;
use tracing::info;

use briefcase_platforms::{run_for_apps, UpdateCommand as Update};

use crate::cli::project::Project;
use crate::cli::{Session, TargetArgs, UpdateArgs};

/// Update the code, requirements or resources of an existing bundle
#[derive(Debug, Args)]
pub struct UpdateCommand {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub updates: UpdateArgs,

    /// Name of the app to update; may be repeated (default: all apps)
    #[arg(short, long = "app", value_name = "APP")]
    pub apps: Vec<String>,
}

impl UpdateCommand {
    pub fn execute(&self, session: &Session<'_>) -> anyhow::Result<()> {
        info!(apps = ?self.apps, updates = ?self.updates, "executing update command");
        let project = Project::load(session, &self.target)?;
        let apps = project.select(&self.apps)?;
        run_for_apps(&Update::new(&project.ctx, self.updates.into()), &apps)?;
        Ok(())
    }
}
