//! The build phase: make sure the bundle exists and is current, then hand
//! it to the format to compile.

use briefcase_core::{AppConfig, BriefcaseError, Result};
use tracing::instrument;

use super::create::CreateCommand;
use super::update::{UpdateCommand, UpdateOptions};
use super::{Command, CommandContext};
use crate::format::Phase;

/// Update handling shared by `build`, `run` and `package`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Refresh app code before building
    pub update: bool,
    pub updates: UpdateOptions,
    /// Never update automatically, even in test mode
    pub no_update: bool,
}

impl BuildOptions {
    /// Reject flag combinations that contradict each other
    pub fn validate(&self) -> Result<()> {
        if !self.no_update {
            return Ok(());
        }
        let conflicts = [
            (self.update, "--update"),
            (self.updates.update_requirements, "--update-requirements"),
            (self.updates.update_resources, "--update-resources"),
            (self.updates.update_support, "--update-support"),
        ];
        match conflicts.iter().find(|(set, _)| *set) {
            Some((_, flag)) => Err(BriefcaseError::command(format!(
                "Cannot specify both {} and --no-update",
                flag
            ))),
            None => Ok(()),
        }
    }

    /// Whether an existing bundle should be updated before use
    pub fn wants_update(&self, app: &AppConfig) -> bool {
        self.update || self.updates.any() || (app.test_mode && !self.no_update)
    }

    /// Update flags with a configured debugger forcing a requirements refresh
    pub fn updates_for(&self, app: &AppConfig) -> UpdateOptions {
        let mut updates = self.updates;
        if app.debugger.is_some() {
            updates.update_requirements = true;
        }
        updates
    }
}

pub struct BuildCommand<'a> {
    ctx: &'a CommandContext,
    options: BuildOptions,
}

impl<'a> BuildCommand<'a> {
    pub fn new(ctx: &'a CommandContext, options: BuildOptions) -> Self {
        Self { ctx, options }
    }

    /// Create or update the bundle as needed, then build it
    #[instrument(skip_all, fields(app = %app.app_name))]
    pub fn build_app(&self, app: &AppConfig) -> Result<()> {
        let ctx = self.ctx;
        let options = self.options;

        if !ctx.bundle_path(app).exists() {
            CreateCommand::new(ctx).create_app(app)?;
        } else if options.wants_update(app) || app.debugger.is_some() {
            let updates = options.updates_for(app);
            UpdateCommand::new(ctx, updates).update_app(app, updates)?;
        }

        ctx.format.verify_app(ctx, app)?;
        ctx.format.build_app(ctx, app)?;

        let qualifier = if app.test_mode { " (test mode)" } else { "" };
        ctx.console().prefixed(
            &app.app_name,
            format!(
                "Built {}{}",
                ctx.relative(&ctx.binary_path(app)).display(),
                qualifier
            ),
        );
        Ok(())
    }
}

impl Command for BuildCommand<'_> {
    fn phase(&self) -> Phase {
        Phase::Build
    }

    fn context(&self) -> &CommandContext {
        self.ctx
    }

    fn execute_app(&self, app: &AppConfig) -> Result<()> {
        self.options.validate()?;
        self.build_app(app)
    }
}
