//! Publication channel registry

use std::sync::Arc;

use briefcase_core::{BriefcaseError, Result};
use tracing::debug;

use crate::apple::AppStoreChannel;
use crate::google_play::PlayStoreChannel;
use crate::traits::PublicationChannel;

/// Registry of available publication channels
pub struct ChannelRegistry {
    channels: Vec<Arc<dyn PublicationChannel>>,
}

impl ChannelRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
        }
    }

    /// Create a registry holding the built-in channels
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(AppStoreChannel)?;
        registry.register(PlayStoreChannel)?;
        Ok(registry)
    }

    /// Register a channel; names must be unique
    pub fn register<C: PublicationChannel + 'static>(&mut self, channel: C) -> Result<()> {
        self.register_arc(Arc::new(channel))
    }

    /// Register a pre-built channel
    pub fn register_arc(&mut self, channel: Arc<dyn PublicationChannel>) -> Result<()> {
        let name = channel.name();
        if self.channels.iter().any(|c| c.name() == name) {
            return Err(BriefcaseError::config(format!(
                "Publication channel '{}' is registered more than once",
                name
            )));
        }
        debug!(channel = name, "registering publication channel");
        self.channels.push(channel);
        Ok(())
    }

    /// Get a channel by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn PublicationChannel>> {
        let result = self.channels.iter().find(|c| c.name() == name).cloned();
        debug!(channel = name, found = result.is_some(), "Looking up publication channel");
        result
    }

    /// Channels able to publish the given platform and format
    pub fn for_format(&self, platform: &str, output_format: &str) -> Vec<Arc<dyn PublicationChannel>> {
        self.channels
            .iter()
            .filter(|c| c.supports(platform, output_format))
            .cloned()
            .collect()
    }

    /// Resolve the channel to publish with. Without an explicit name the
    /// format's only channel is used.
    pub fn resolve(
        &self,
        platform: &str,
        output_format: &str,
        name: Option<&str>,
    ) -> Result<Arc<dyn PublicationChannel>> {
        let available = self.for_format(platform, output_format);
        match name {
            Some(name) => available
                .into_iter()
                .find(|c| c.name() == name)
                .ok_or_else(|| {
                    BriefcaseError::command(format!(
                        "Unknown publication channel '{}' for {} {}; (choose from: {})",
                        name,
                        platform,
                        output_format,
                        self.names_for(platform, output_format).join(", ")
                    ))
                }),
            None => match available.as_slice() {
                [] => Err(BriefcaseError::command(format!(
                    "No publication channels are available for {} {}.",
                    platform, output_format
                ))),
                [only] => Ok(only.clone()),
                _ => Err(BriefcaseError::command(format!(
                    "More than one publication channel is available for {} {}; \
                     use --channel to select one of: {}",
                    platform,
                    output_format,
                    self.names_for(platform, output_format).join(", ")
                ))),
            },
        }
    }

    fn names_for(&self, platform: &str, output_format: &str) -> Vec<&'static str> {
        self.for_format(platform, output_format)
            .iter()
            .map(|c| c.name())
            .collect()
    }

    /// Get all registered channels
    pub fn all(&self) -> &[Arc<dyn PublicationChannel>] {
        &self.channels
    }

    /// Get names of all registered channels
    pub fn names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::PublishCommandApi;
    use crate::types::{ChannelTarget, PublishOptions};
    use briefcase_core::AppConfig;

    struct MockChannel {
        name: &'static str,
        targets: Vec<ChannelTarget>,
    }

    impl MockChannel {
        fn new(name: &'static str, platform: &'static str, output_format: &'static str) -> Self {
            Self {
                name,
                targets: vec![ChannelTarget::new(platform, output_format)],
            }
        }
    }

    impl PublicationChannel for MockChannel {
        fn name(&self) -> &'static str {
            self.name
        }

        fn full_name(&self) -> &'static str {
            "Mock"
        }

        fn targets(&self) -> &[ChannelTarget] {
            &self.targets
        }

        fn publish_app(
            &self,
            _app: &AppConfig,
            _command: &dyn PublishCommandApi,
            _options: &PublishOptions,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_empty_registry() {
        let registry = ChannelRegistry::new();
        assert!(registry.all().is_empty());
        assert!(registry.names().is_empty());
        assert!(registry.get("anything").is_none());
        assert!(registry.for_format("iOS", "Xcode").is_empty());
    }

    #[test]
    fn test_builtins() {
        let registry = ChannelRegistry::with_builtins().unwrap();
        assert_eq!(registry.names(), vec!["appstore", "playstore"]);
        assert_eq!(
            registry.resolve("iOS", "Xcode", None).unwrap().name(),
            "appstore"
        );
        assert_eq!(
            registry.resolve("android", "gradle", None).unwrap().name(),
            "playstore"
        );
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut registry = ChannelRegistry::new();
        registry.register(MockChannel::new("s3", "linux", "AppImage")).unwrap();
        let err = registry
            .register(MockChannel::new("s3", "macOS", "app"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Briefcase configuration error: Publication channel 's3' is registered more than once"
        );
        assert_eq!(registry.all().len(), 1);
    }

    #[test]
    fn test_resolve() {
        let mut registry = ChannelRegistry::new();
        registry.register(MockChannel::new("s3", "linux", "AppImage")).unwrap();
        registry.register(MockChannel::new("github", "linux", "AppImage")).unwrap();
        registry.register(MockChannel::new("store", "macOS", "app")).unwrap();

        assert_eq!(
            registry.resolve("linux", "AppImage", Some("github")).unwrap().name(),
            "github"
        );
        let err = registry.resolve("linux", "AppImage", None).err().unwrap();
        assert!(err.to_string().contains("use --channel to select one of: s3, github"));

        let err = registry.resolve("linux", "AppImage", Some("store")).err().unwrap();
        assert!(err.to_string().starts_with("Unknown publication channel 'store'"));

        let err = registry.resolve("windows", "app", None).err().unwrap();
        assert_eq!(err.to_string(), "No publication channels are available for windows app.");
    }
}
