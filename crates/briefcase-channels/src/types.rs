//! Common types for publication channels

use std::collections::BTreeMap;

use serde::Serialize;

/// A platform and output format a channel can publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ChannelTarget {
    pub platform: &'static str,
    pub output_format: &'static str,
}

impl ChannelTarget {
    pub const fn new(platform: &'static str, output_format: &'static str) -> Self {
        Self {
            platform,
            output_format,
        }
    }

    pub fn matches(&self, platform: &str, output_format: &str) -> bool {
        self.platform == platform && self.output_format == output_format
    }
}

impl std::fmt::Display for ChannelTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.platform, self.output_format)
    }
}

/// Options passed through to a channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Validate the artifact but don't upload it
    pub dry_run: bool,

    /// Channel-specific settings (for example a release track)
    pub settings: BTreeMap<String, String>,
}

impl PublishOptions {
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }
}
