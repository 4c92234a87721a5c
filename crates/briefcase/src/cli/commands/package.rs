//! Package command - turn built apps into distributable artifacts

use clap::Args;
use tracing::info;

use briefcase_platforms::{run_for_apps, PackageCommand as Package, PackageOptions};

use crate::cli::project::Project;
use crate::cli::{Session, TargetArgs};

/// Package an app for distribution
#[derive(Debug, Args)]
pub struct PackageCommand {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Name of the app to package; may be repeated (default: all apps)
    #[arg(short, long = "app", value_name = "APP")]
    pub apps: Vec<String>,

    /// Update and rebuild the app before packaging
    #[arg(short, long)]
    pub update: bool,
}

impl PackageCommand {
    pub fn execute(&self, session: &Session<'_>) -> anyhow::Result<()> {
        info!(apps = ?self.apps, update = self.update, "executing package command");
        let project = Project::load(session, &self.target)?;
        let apps = project.select(&self.apps)?;
        let options = PackageOptions { update: self.update };
        run_for_apps(&Package::new(&project.ctx, options), &apps)?;
        Ok(())
    }
}
