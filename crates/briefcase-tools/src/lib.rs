//! Briefcase Tools - external tool verification and process execution
//!
//! ## Tool cache
//!
//! [`ToolCache`] is created once per command invocation. Tools are verified
//! into it through [`Tool::verify`]; a tool is attached at most once and every
//! later verification returns the cached instance.
//!
//! ## Execution contexts
//!
//! [`AppContext`] abstracts where an app's subprocesses run: directly on the
//! host, inside a virtual environment, inside a Docker container or inside a
//! Flatpak sandbox. All variants share the same `run`/`popen`/`check_output`
//! surface.
//!
//! ## Subprocesses
//!
//! [`Subprocess`] wraps process creation with environment merging, output
//! streaming and interrupt-aware cleanup.

pub mod cache;
pub mod context;
pub mod docker;
pub mod file;
pub mod flatpak;
pub mod git;
pub mod linuxdeploy;
pub mod python;
pub mod subprocess;
pub mod tool;
pub mod venv;
pub mod wix;
pub mod xcode;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::ToolCache;
pub use context::{AppContext, NativeAppContext};
pub use docker::{Docker, DockerAppContext};
pub use file::{File, RetryPolicy};
pub use flatpak::{Flatpak, FlatpakAppContext};
pub use git::Git;
pub use linuxdeploy::LinuxDeploy;
pub use python::Python;
pub use subprocess::{
    CompletedProcess, Filtered, Popen, StreamFilter, Subprocess, SubprocessOptions,
};
pub use tool::{
    installed_managed_tools, ManagedTool, ManagedToolHandle, Tool, ToolId, VerifyOptions,
};
pub use venv::{
    pip_install, virtual_environment, NoOpEnvironment, NoOpVenvContext, VenvContext, VenvEnvironment,
    VirtualEnvironment,
};
pub use wix::WiX;
pub use xcode::{Xcode, XcodeCliTools};
