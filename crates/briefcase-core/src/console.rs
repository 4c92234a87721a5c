//! User-facing console output
//!
//! Every message printed for the user is mirrored as a tracing event so the
//! log file carries the complete transcript of a run.

use std::time::Duration;

use console::style;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, warn};

use crate::error::{BriefcaseError, Result};

/// How chatty the console should be
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
    Debug,
}

impl Verbosity {
    /// Map a `-v` occurrence count to a verbosity level
    pub fn from_occurrences(count: u8) -> Self {
        match count {
            0 => Self::Normal,
            1 => Self::Verbose,
            _ => Self::Debug,
        }
    }
}

/// Console context passed to every component that talks to the user
#[derive(Debug, Clone)]
pub struct Console {
    verbosity: Verbosity,
    interactive: bool,
}

impl Default for Console {
    fn default() -> Self {
        Self::new(Verbosity::Normal, true)
    }
}

impl Console {
    pub fn new(verbosity: Verbosity, interactive: bool) -> Self {
        Self {
            verbosity,
            interactive,
        }
    }

    /// A console that prints nothing and never prompts
    pub fn silent() -> Self {
        Self::new(Verbosity::Quiet, false)
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn is_verbose(&self) -> bool {
        self.verbosity >= Verbosity::Verbose
    }

    fn shows(&self, level: Verbosity) -> bool {
        self.verbosity != Verbosity::Quiet && self.verbosity >= level
    }

    pub fn info(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!("{}", message);
        if self.shows(Verbosity::Normal) {
            println!("{}", message);
        }
    }

    /// Print a message tagged with the app (or tool) it relates to
    pub fn prefixed(&self, prefix: &str, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!(prefix, "{}", message);
        if self.shows(Verbosity::Normal) {
            println!("{} {}", style(format!("[{}]", prefix)).bold(), message);
        }
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        warn!("{}", message);
        if self.shows(Verbosity::Normal) {
            println!("{}", style(message).yellow());
        }
    }

    pub fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        error!("{}", message);
        eprintln!("{}", style(message).red());
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        debug!("{}", message);
        if self.shows(Verbosity::Debug) {
            println!("{}", style(message).dim());
        }
    }

    /// Print a horizontal rule, optionally carrying a title
    pub fn divider(&self, title: Option<&str>) {
        let line = match title {
            Some(title) => format!("[{}] {}", title, "=".repeat(75usize.saturating_sub(title.len() + 3))),
            None => "=".repeat(75),
        };
        self.info(line);
    }

    /// Start a spinner for a blocking operation of unknown length
    pub fn wait_bar(&self, message: impl Into<String>) -> WaitBar {
        let message = message.into();
        info!("{}...", message);
        let bar = if self.shows(Verbosity::Normal) {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.set_message(format!("{}...", message));
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        } else {
            ProgressBar::hidden()
        };
        WaitBar {
            bar,
            message,
            visible: self.shows(Verbosity::Normal),
            finished: false,
        }
    }

    /// Create a progress bar; `total` is the number of bytes when known
    pub fn progress_bar(&self, total: Option<u64>) -> ProgressBar {
        if !self.shows(Verbosity::Normal) {
            return ProgressBar::hidden();
        }
        match total {
            Some(total) => {
                let bar = ProgressBar::new(total);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                bar
            }
            None => ProgressBar::new_spinner(),
        }
    }

    /// Ask a yes/no question; non-interactive consoles answer with the default
    pub fn input_boolean(&self, question: &str, default: bool) -> Result<bool> {
        if !self.interactive {
            debug!(question, default, "non-interactive; using default answer");
            return Ok(default);
        }
        Confirm::new()
            .with_prompt(question)
            .default(default)
            .interact()
            .map_err(|e| BriefcaseError::command(format!("Unable to read user input: {}", e)))
    }
}

/// Spinner shown while a blocking operation runs
pub struct WaitBar {
    bar: ProgressBar,
    message: String,
    visible: bool,
    finished: bool,
}

impl WaitBar {
    /// Mark the operation as complete
    pub fn done(mut self) {
        self.finished = true;
        self.bar.finish_and_clear();
        info!("{}... done", self.message);
        if self.visible {
            println!("{}... done", self.message);
        }
    }
}

impl Drop for WaitBar {
    fn drop(&mut self) {
        if !self.finished {
            self.bar.finish_and_clear();
        }
    }
}
