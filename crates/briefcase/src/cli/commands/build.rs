//! Build command - compile app bundles, creating or updating them first as needed

use clap::Args;
use tracing::info;

use briefcase_platforms::{run_for_apps, BuildCommand as Build, BuildOptions};

use crate::cli::project::{configure_apps, Project};
use crate::cli::{Session, TargetArgs, UpdateArgs};

/// Build an app bundle
#[derive(Debug, Args)]
pub struct BuildCommand {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub updates: UpdateArgs,

    /// Name of the app to build; may be repeated (default: all apps)
    #[arg(short, long = "app", value_name = "APP")]
    pub apps: Vec<String>,

    /// Update the app's code before building
    #[arg(short, long)]
    pub update: bool,

    /// Never update the app before building, even in test mode
    #[arg(long)]
    pub no_update: bool,

    /// Build the app with its test suite as the entry point
    #[arg(long)]
    pub test: bool,

    /// Bundle a remote debugger: [DEBUGGER[,[IP:]PORT][,MODE]]
    #[arg(long, value_name = "SPEC", num_args = 0..=1, default_missing_value = "")]
    pub debug: Option<String>,
}

impl BuildCommand {
    pub fn options(&self) -> BuildOptions {
        BuildOptions {
            update: self.update,
            updates: self.updates.into(),
            no_update: self.no_update,
        }
    }

    pub fn execute(&self, session: &Session<'_>) -> anyhow::Result<()> {
        info!(apps = ?self.apps, test = self.test, "executing build command");
        let options = self.options();
        options.validate()?;

        let project = Project::load(session, &self.target)?;
        let mut apps = project.select(&self.apps)?;
        configure_apps(&mut apps, self.test, self.debug.as_deref())?;
        run_for_apps(&Build::new(&project.ctx, options), &apps)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn parse(args: &[&str]) -> BuildCommand {
        let mut argv = vec!["briefcase", "build"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Some(Commands::Build(build)) => build,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_debug_without_value() {
        assert_eq!(parse(&["--debug"]).debug.as_deref(), Some(""));
        assert_eq!(parse(&["--debug", "debugpy"]).debug.as_deref(), Some("debugpy"));
        assert_eq!(parse(&[]).debug, None);
    }

    #[test]
    fn test_conflicting_update_flags() {
        let build = parse(&["-u", "--no-update"]);
        let err = build.options().validate().unwrap_err();
        assert_eq!(err.to_string(), "Cannot specify both --update and --no-update");
    }
}
