//! The publish phase: hand packaged apps to a publication channel.

use std::path::PathBuf;
use std::sync::Arc;

use briefcase_channels::{ChannelRegistry, PublicationChannel, PublishCommandApi, PublishOptions};
use briefcase_core::{AppConfig, BriefcaseError, Console, Result};
use briefcase_tools::ToolCache;
use tracing::instrument;

use super::{run_for_apps, Command, CommandContext};
use crate::format::Phase;

pub struct PublishCommand<'a> {
    ctx: &'a CommandContext,
    channel: Arc<dyn PublicationChannel>,
    options: PublishOptions,
}

impl<'a> PublishCommand<'a> {
    /// Resolve the channel once, before any app is touched
    pub fn new(
        ctx: &'a CommandContext,
        channels: &ChannelRegistry,
        channel: Option<&str>,
        options: PublishOptions,
    ) -> Result<Self> {
        let channel = channels.resolve(ctx.format.platform(), ctx.format.output_format(), channel)?;
        Ok(Self {
            ctx,
            channel,
            options,
        })
    }

    pub fn channel(&self) -> &dyn PublicationChannel {
        self.channel.as_ref()
    }

    /// Publish every app, refusing to start unless all of them are built
    pub fn publish_apps(&self, apps: &[AppConfig]) -> Result<()> {
        for app in apps {
            if !self.ctx.binary_path(app).exists() {
                return Err(BriefcaseError::command(format!(
                    "Application {} has not been built. Build (and test!) the app before publishing.",
                    app.app_name
                )));
            }
        }
        run_for_apps(self, apps)
    }

    #[instrument(skip_all, fields(app = %app.app_name, channel = self.channel.name()))]
    fn publish_app(&self, app: &AppConfig) -> Result<()> {
        self.ctx.format.verify_app(self.ctx, app)?;
        self.channel.publish_app(app, self, &self.options)
    }
}

impl PublishCommandApi for PublishCommand<'_> {
    fn console(&self) -> &Console {
        self.ctx.console()
    }

    fn tools(&self) -> &ToolCache {
        &self.ctx.tools
    }

    fn distribution_path(&self, app: &AppConfig) -> PathBuf {
        self.ctx.distribution_path(app)
    }
}

impl Command for PublishCommand<'_> {
    fn phase(&self) -> Phase {
        Phase::Publish
    }

    fn context(&self) -> &CommandContext {
        self.ctx
    }

    fn execute_app(&self, app: &AppConfig) -> Result<()> {
        self.publish_app(app)
    }
}
