//! Google Play Store channel

use briefcase_core::{AppConfig, BriefcaseError, Result};
use tracing::{info, instrument};

use crate::traits::{packaged_artifact, PublicationChannel, PublishCommandApi};
use crate::types::{ChannelTarget, PublishOptions};

const TARGETS: [ChannelTarget; 1] = [ChannelTarget::new("android", "gradle")];

/// Publishes Android app bundles to Google Play
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayStoreChannel;

impl PublicationChannel for PlayStoreChannel {
    fn name(&self) -> &'static str {
        "playstore"
    }

    fn full_name(&self) -> &'static str {
        "Google Play Store"
    }

    fn targets(&self) -> &[ChannelTarget] {
        &TARGETS
    }

    #[instrument(skip_all, fields(app = %app.app_name))]
    fn publish_app(
        &self,
        app: &AppConfig,
        command: &dyn PublishCommandApi,
        options: &PublishOptions,
    ) -> Result<()> {
        let artifact = packaged_artifact(app, command)?;
        let track = options.setting("track").unwrap_or("internal");
        info!(artifact = %artifact.display(), track, "publishing to Google Play");
        command.console().info(format!(
            "Publishing {} to the {} ({} track)",
            artifact.display(),
            self.full_name(),
            track
        ));
        Err(BriefcaseError::command(
            "Publishing to the Google Play Store is not yet implemented.",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apple::tests::{app, FakePublish};
    use tempfile::TempDir;

    #[test]
    fn test_targets() {
        let channel = PlayStoreChannel;
        assert!(channel.supports("android", "gradle"));
        assert!(!channel.supports("iOS", "Xcode"));
    }

    #[test]
    fn test_publish_not_implemented() {
        let tmp = TempDir::new().unwrap();
        let command = FakePublish::new(tmp.path(), "first-app-0.0.1.aab");
        std::fs::create_dir_all(command.artifact.parent().unwrap()).unwrap();
        std::fs::write(&command.artifact, b"aab").unwrap();

        let mut options = PublishOptions::default();
        options.settings.insert("track".into(), "beta".into());
        let err = PlayStoreChannel
            .publish_app(&app(), &command, &options)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Publishing to the Google Play Store is not yet implemented."
        );
    }

    #[test]
    fn test_unpackaged_app() {
        let tmp = TempDir::new().unwrap();
        let command = FakePublish::new(tmp.path(), "first-app-0.0.1.aab");
        let err = PlayStoreChannel
            .publish_app(&app(), &command, &PublishOptions::default())
            .unwrap_err();
        assert!(err.to_string().starts_with("Application first-app has not been packaged."));
    }
}
