//! Briefcase Platforms - output formats and the app lifecycle
//!
//! An app moves through a fixed sequence of phases:
//!
//! ```text
//! create -> update -> build -> run
//!                           -> package -> publish
//! ```
//!
//! Each phase is a command that owns the sequencing, the "do the earlier
//! phase first" checks and the per-app error handling. What differs between
//! targets lives behind the [`Format`] trait: where the binary and the
//! distributable artifact end up, which tools must be verified, and how to
//! build, run and package.
//!
//! ## Built-in formats
//!
//! | Platform | Format     | Default | Packaging                     |
//! |----------|------------|---------|-------------------------------|
//! | linux    | `AppImage` | yes     | linuxdeploy, optionally Docker |
//! | linux    | `flatpak`  |         | `flatpak build-bundle`        |
//! | macOS    | `app`      | yes     | ad-hoc signed, zipped         |
//! | windows  | `app`      | yes     | WiX MSI or zip                |
//! | iOS      | `Xcode`    | yes     | published through Xcode       |
//!
//! ## Running apps
//!
//! `run` streams the app's output through a [`LogFilter`], which also watches
//! for the exit sentinel the app prints when its test suite finishes.

pub mod command;
pub mod debuggers;
pub mod format;
pub mod log_filter;
pub mod path_index;
pub mod platforms;
pub mod registry;
pub mod template;

pub use command::{
    run_for_apps, select_apps, select_single_app, BuildCommand, BuildOptions, Command, CommandContext,
    CreateCommand, PackageCommand, PackageOptions, PublishCommand, RunCommand, RunOptions, UpdateCommand,
    UpdateOptions, UpgradeCommand,
};
pub use debuggers::{parse_debugger_spec, Debugger, DebuggerRegistry, DebuggerSpec};
pub use format::{Format, Phase, BASE_TOOLS};
pub use log_filter::{ExitFilter, LogFilter, MISSING_RETURNCODE, UNPARSABLE_RETURNCODE};
pub use path_index::{BundlePaths, PathIndex};
pub use platforms::BuiltinOptions;
pub use registry::{host_platform, PlatformRegistry};
pub use template::{Cookiecutter, TemplateEngine};
