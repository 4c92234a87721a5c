//! Filtering a running app's output
//!
//! Apps print an exit sentinel (`>>>>>>>>>> EXIT <code> <<<<<<<<<<`) when they
//! finish. On platforms where the process being watched is a log reader rather
//! than the app itself, the sentinel is the only reliable way to learn the
//! app's return code.

use std::collections::VecDeque;

use briefcase_core::{BriefcaseError, Result};
use briefcase_tools::{Filtered, StreamFilter};
use regex::{Regex, RegexBuilder};
use tracing::debug;

/// Sentinel printed by the app bootstrap when the app exits
pub const DEFAULT_EXIT_REGEX: &str = r"^>>>>>>>>>> EXIT (?P<returncode>.*) <<<<<<<<<<$";

/// Reported when the exit pattern matched but has no `returncode` group
pub const MISSING_RETURNCODE: i32 = -998;

/// Reported when the `returncode` group isn't an integer
pub const UNPARSABLE_RETURNCODE: i32 = -999;

/// How many included lines the exit pattern is matched against
const HISTORY_LINES: usize = 10;

/// Strips log-system preamble from a raw line.
///
/// Returns `None` to drop the line entirely, otherwise the clean line and
/// whether it is app output that should be checked for the exit sentinel.
pub type CleanFilter = fn(&str) -> Option<(String, bool)>;

/// Recognises the exit sentinel in recent output
#[derive(Debug, Clone)]
pub struct ExitFilter {
    regex: Regex,
}

impl ExitFilter {
    /// Compile `pattern` in multi-line mode
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = RegexBuilder::new(pattern)
            .multi_line(true)
            .build()
            .map_err(|e| BriefcaseError::config(format!("Invalid exit_regex {:?}: {}", pattern, e)))?;
        Ok(Self { regex })
    }

    /// The app's own pattern, or the default sentinel
    pub fn for_pattern(pattern: Option<&str>) -> Result<Self> {
        Self::new(pattern.unwrap_or(DEFAULT_EXIT_REGEX))
    }

    /// Return code announced in `recent`, if the app has announced one
    pub fn returncode(&self, recent: &str) -> Option<i32> {
        let caps = self.regex.captures(recent)?;
        let code = match caps.name("returncode") {
            None => MISSING_RETURNCODE,
            Some(code) => code.as_str().trim().parse().unwrap_or(UNPARSABLE_RETURNCODE),
        };
        Some(code)
    }
}

/// Stream filter that cleans each line and stops streaming once the app
/// reports its exit.
pub struct LogFilter {
    clean_filter: Option<CleanFilter>,
    clean_output: bool,
    exit_filter: ExitFilter,
    recent_history: VecDeque<String>,
    returncode: Option<i32>,
}

impl LogFilter {
    pub fn new(exit_filter: ExitFilter) -> Self {
        Self {
            clean_filter: None,
            clean_output: false,
            exit_filter,
            recent_history: VecDeque::with_capacity(HISTORY_LINES),
            returncode: None,
        }
    }

    /// Clean lines with `filter`; `clean_output` shows the cleaned line
    /// rather than the raw one
    pub fn with_clean_filter(mut self, filter: CleanFilter, clean_output: bool) -> Self {
        self.clean_filter = Some(filter);
        self.clean_output = clean_output;
        self
    }

    /// The return code announced by the app, once streaming has stopped
    pub fn returncode(&self) -> Option<i32> {
        self.returncode
    }
}

impl StreamFilter for LogFilter {
    fn filter(&mut self, line: &str) -> Filtered {
        let (clean_line, included) = match self.clean_filter {
            Some(clean) => match clean(line) {
                Some(filtered) => filtered,
                None => return Filtered::Lines(Vec::new()),
            },
            None => (line.to_string(), true),
        };

        let display_line = if self.clean_output {
            clean_line.clone()
        } else {
            line.to_string()
        };

        if included {
            if self.recent_history.len() == HISTORY_LINES {
                self.recent_history.pop_front();
            }
            self.recent_history.push_back(clean_line);
            let tail = Vec::from(self.recent_history.clone()).join("\n");
            if let Some(code) = self.exit_filter.returncode(&tail) {
                debug!(returncode = code, "exit sentinel found");
                self.returncode = Some(code);
                return Filtered::Stop;
            }
        }

        Filtered::Lines(vec![display_line])
    }
}
