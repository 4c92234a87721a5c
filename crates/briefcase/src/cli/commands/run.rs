//! Run command - start an app, building it first if needed

use clap::Args;
use tracing::info;

use briefcase_platforms::{select_single_app, BuildOptions, RunCommand as Run, RunOptions};

use crate::cli::project::{configure_apps, Project};
use crate::cli::{Session, TargetArgs, UpdateArgs};

/// Run an app
#[derive(Debug, Args)]
pub struct RunCommand {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub updates: UpdateArgs,

    /// Name of the app to run; required when the project defines several
    #[arg(short, long)]
    pub app: Option<String>,

    /// Update the app's code before running
    #[arg(short, long)]
    pub update: bool,

    /// Never update the app before running, even in test mode
    #[arg(long)]
    pub no_update: bool,

    /// Run the app's test suite
    #[arg(long)]
    pub test: bool,

    /// Run with a remote debugger: [DEBUGGER[,[IP:]PORT][,MODE]]
    #[arg(long, value_name = "SPEC", num_args = 0..=1, default_missing_value = "")]
    pub debug: Option<String>,

    /// Arguments passed through to the app
    #[arg(last = true)]
    pub passthrough: Vec<String>,
}

impl RunCommand {
    pub fn options(&self) -> RunOptions {
        RunOptions {
            build: BuildOptions {
                update: self.update,
                updates: self.updates.into(),
                no_update: self.no_update,
            },
            passthrough: self.passthrough.clone(),
        }
    }

    pub fn execute(&self, session: &Session<'_>) -> anyhow::Result<()> {
        info!(app = ?self.app, test = self.test, "executing run command");
        let project = Project::load(session, &self.target)?;
        let app = select_single_app(&project.apps, self.app.as_deref())?;

        let mut apps = vec![app];
        configure_apps(&mut apps, self.test, self.debug.as_deref())?;
        Run::new(&project.ctx, self.options()).run(&apps[0])?;
        Ok(())
    }
}
