//! Project configuration for briefcase

mod loader;
pub mod merge;
pub mod overrides;
mod types;
pub mod validation;

pub use loader::*;
pub use merge::{merge_config, merge_pep621_config, MERGEABLE_KEYS};
pub use overrides::{apply_config_overrides, parse_config_overrides};
pub use types::*;
pub use validation::validate_app;
