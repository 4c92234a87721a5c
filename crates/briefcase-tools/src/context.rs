//! Execution contexts
//!
//! An [`AppContext`] decides where an app's commands actually run: directly
//! on the host, inside a virtual environment, in a Docker container, or in a
//! Flatpak sandbox. Callers issue the same `run`/`check_output`/`popen`
//! calls regardless; each context rewrites the command and options it is
//! given into a new invocation and leaves the caller's values untouched.

use briefcase_core::Result;

use crate::subprocess::{CompletedProcess, Popen, Subprocess, SubprocessOptions};

pub trait AppContext {
    fn run(&self, args: &[String], options: &SubprocessOptions) -> Result<CompletedProcess>;

    fn check_output(&self, args: &[String], options: &SubprocessOptions) -> Result<String>;

    fn popen(&self, args: &[String], options: &SubprocessOptions) -> Result<Popen>;

    /// The host facade, for streaming and cleaning up started processes
    fn subprocess(&self) -> &Subprocess;
}

/// Runs commands directly on the host
#[derive(Debug, Clone)]
pub struct NativeAppContext {
    subprocess: Subprocess,
}

impl NativeAppContext {
    pub fn new(subprocess: Subprocess) -> Self {
        Self { subprocess }
    }
}

impl AppContext for NativeAppContext {
    fn run(&self, args: &[String], options: &SubprocessOptions) -> Result<CompletedProcess> {
        self.subprocess.run(args, options)
    }

    fn check_output(&self, args: &[String], options: &SubprocessOptions) -> Result<String> {
        self.subprocess.check_output(args, options)
    }

    fn popen(&self, args: &[String], options: &SubprocessOptions) -> Result<Popen> {
        self.subprocess.popen(args, options)
    }

    fn subprocess(&self) -> &Subprocess {
        &self.subprocess
    }
}
