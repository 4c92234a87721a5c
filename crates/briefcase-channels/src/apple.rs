//! Apple App Store channel

use briefcase_core::{AppConfig, BriefcaseError, Result};
use tracing::{info, instrument};

use crate::traits::{packaged_artifact, PublicationChannel, PublishCommandApi};
use crate::types::{ChannelTarget, PublishOptions};

const TARGETS: [ChannelTarget; 1] = [ChannelTarget::new("iOS", "Xcode")];

/// Publishes iOS apps through App Store Connect
#[derive(Debug, Clone, Copy, Default)]
pub struct AppStoreChannel;

impl PublicationChannel for AppStoreChannel {
    fn name(&self) -> &'static str {
        "appstore"
    }

    fn full_name(&self) -> &'static str {
        "Apple App Store"
    }

    fn targets(&self) -> &[ChannelTarget] {
        &TARGETS
    }

    #[instrument(skip_all, fields(app = %app.app_name))]
    fn publish_app(
        &self,
        app: &AppConfig,
        command: &dyn PublishCommandApi,
        _options: &PublishOptions,
    ) -> Result<()> {
        let artifact = packaged_artifact(app, command)?;
        info!(artifact = %artifact.display(), "publishing to the App Store");
        command.console().info(format!(
            "Publishing {} to the {}",
            artifact.display(),
            self.full_name()
        ));
        Err(BriefcaseError::command(
            "Publishing to the Apple App Store is not yet implemented.",
        ))
    }
}
