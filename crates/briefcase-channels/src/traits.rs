//! Publication channel traits

use std::path::PathBuf;

use briefcase_core::{AppConfig, BriefcaseError, Console, Result};
use briefcase_tools::ToolCache;

use crate::types::{ChannelTarget, PublishOptions};

/// The parts of a publish command a channel may use
pub trait PublishCommandApi {
    fn console(&self) -> &Console;

    fn tools(&self) -> &ToolCache;

    /// The single file that is uploaded for distribution
    fn distribution_path(&self, app: &AppConfig) -> PathBuf;
}

/// A destination packaged apps can be published to
pub trait PublicationChannel {
    /// Identifier used on the command line (`-c/--channel`)
    fn name(&self) -> &'static str;

    /// Human-readable name
    fn full_name(&self) -> &'static str;

    /// Formats this channel accepts
    fn targets(&self) -> &[ChannelTarget];

    fn supports(&self, platform: &str, output_format: &str) -> bool {
        self.targets()
            .iter()
            .any(|target| target.matches(platform, output_format))
    }

    /// Deliver `app`'s distribution artifact
    fn publish_app(
        &self,
        app: &AppConfig,
        command: &dyn PublishCommandApi,
        options: &PublishOptions,
    ) -> Result<()>;
}

/// The distribution artifact for `app`, failing if it hasn't been packaged
pub fn packaged_artifact(app: &AppConfig, command: &dyn PublishCommandApi) -> Result<PathBuf> {
    let artifact = command.distribution_path(app);
    if artifact.exists() {
        Ok(artifact)
    } else {
        Err(BriefcaseError::command(format!(
            "Application {} has not been packaged. Package the app before publishing.",
            app.app_name
        )))
    }
}
