//! The package phase: turn a built app into its distributable artifact.

use std::fs;

use briefcase_core::{AppConfig, Result};
use tracing::instrument;

use super::build::{BuildCommand, BuildOptions};
use super::create::CreateCommand;
use super::update::{UpdateCommand, UpdateOptions};
use super::{Command, CommandContext};
use crate::format::Phase;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackageOptions {
    /// Update everything and rebuild before packaging
    pub update: bool,
}

pub struct PackageCommand<'a> {
    ctx: &'a CommandContext,
    options: PackageOptions,
}

impl<'a> PackageCommand<'a> {
    pub fn new(ctx: &'a CommandContext, options: PackageOptions) -> Self {
        Self { ctx, options }
    }

    #[instrument(skip_all, fields(app = %app.app_name))]
    pub fn package_app(&self, app: &AppConfig) -> Result<()> {
        let ctx = self.ctx;
        let build = BuildCommand::new(ctx, BuildOptions::default());

        if !ctx.bundle_path(app).exists() {
            CreateCommand::new(ctx).create_app(app)?;
            build.build_app(app)?;
        } else if self.options.update {
            UpdateCommand::new(ctx, UpdateOptions::all()).update_app(app, UpdateOptions::all())?;
            build.build_app(app)?;
        } else if !ctx.binary_path(app).exists() {
            build.build_app(app)?;
        }

        ctx.format.verify_app(ctx, app)?;

        let distribution_path = ctx.distribution_path(app);
        if distribution_path.is_dir() {
            fs::remove_dir_all(&distribution_path)?;
        } else if distribution_path.exists() {
            fs::remove_file(&distribution_path)?;
        }
        fs::create_dir_all(ctx.dist_path())?;

        ctx.format.package_app(ctx, app)?;

        ctx.console().prefixed(
            &app.app_name,
            format!("Packaged {}", ctx.relative(&distribution_path).display()),
        );
        Ok(())
    }
}

impl Command for PackageCommand<'_> {
    fn phase(&self) -> Phase {
        Phase::Package
    }

    fn context(&self) -> &CommandContext {
        self.ctx
    }

    fn execute_app(&self, app: &AppConfig) -> Result<()> {
        self.package_app(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::run_for_apps;
    use crate::command::tests::{first_app, project};

    #[test]
    fn test_package_from_scratch() {
        let project = project();
        let app = first_app();
        run_for_apps(
            &PackageCommand::new(&project.ctx, PackageOptions::default()),
            &[app.clone()],
        )
        .unwrap();

        assert!(project.ctx.binary_path(&app).exists());
        assert_eq!(
            fs::read_to_string(project.ctx.distribution_path(&app)).unwrap(),
            "package"
        );
    }

    #[test]
    fn test_package_replaces_old_artifact() {
        let project = project();
        let app = first_app();
        let command = PackageCommand::new(&project.ctx, PackageOptions::default());
        command.package_app(&app).unwrap();
        fs::write(project.ctx.distribution_path(&app), "stale").unwrap();

        command.package_app(&app).unwrap();
        assert_eq!(
            fs::read_to_string(project.ctx.distribution_path(&app)).unwrap(),
            "package"
        );
        // The bundle was only generated once
        assert_eq!(project.calls.borrow().len(), 1);
    }
}
