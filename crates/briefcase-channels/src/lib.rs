//! Publication channels for briefcase
//!
//! A publication channel takes a packaged app and delivers it somewhere:
//! an app store, a package index, a bucket. Channels only see the narrow
//! [`PublishCommandApi`] surface of the publish command (console, tool cache
//! and distribution artifact path), so they can be written without knowing
//! anything else about how the artifact was produced.
//!
//! ## Built-in channels
//!
//! - **appstore**: Apple App Store (iOS/Xcode)
//! - **playstore**: Google Play Store (android/gradle)

pub mod apple;
pub mod google_play;
pub mod registry;
pub mod traits;
pub mod types;

pub use registry::ChannelRegistry;
pub use traits::{PublicationChannel, PublishCommandApi};
pub use types::{ChannelTarget, PublishOptions};
