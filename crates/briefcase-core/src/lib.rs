//! Briefcase Core - shared foundations for the briefcase packaging tool
//!
//! This crate provides the pieces every other briefcase crate builds on:
//!
//! ## Errors
//!
//! [`BriefcaseError`] is the single error taxonomy. Every variant carries its
//! final, user-facing message and maps to a process exit code via
//! [`BriefcaseError::error_code`].
//!
//! ## Console
//!
//! [`Console`] is the user-facing printer. It is passed explicitly to every
//! component that needs to talk to the user; there is no global printer.
//!
//! ## Configuration
//!
//! The [`config`] module parses `pyproject.toml`, layers global, app, platform
//! and format tables, applies command-line overrides and validates the result
//! into [`AppConfig`] values.

pub mod config;
pub mod console;
pub mod error;
pub mod host;

pub use config::{AppConfig, ConnectionMode, DebuggerConfig, GlobalConfig};
pub use console::{Console, Verbosity, WaitBar};
pub use error::{BriefcaseError, CalledProcessError, Result};
