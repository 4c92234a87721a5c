//! The tool cache
//!
//! A [`ToolCache`] carries the host description and holds every tool that
//! has been verified during this invocation. Tools are keyed by their short
//! name, so each one is verified at most once.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use briefcase_core::host;
use briefcase_core::Console;
use tracing::debug;

use crate::subprocess::Subprocess;
use crate::tool::Tool;

/// Environment variable naming the Python interpreter briefcase should use
pub const BRIEFCASE_PYTHON: &str = "BRIEFCASE_PYTHON";

pub struct ToolCache {
    pub console: Console,
    pub subprocess: Subprocess,
    /// `Darwin`, `Linux` or `Windows`
    pub host_os: String,
    pub host_arch: String,
    /// Root of briefcase's data directory
    pub data_path: PathBuf,
    /// Where managed tools are installed
    pub base_path: PathBuf,
    pub home_path: PathBuf,
    /// Interpreter running briefcase's Python-side work
    pub host_python: PathBuf,
    tools: RefCell<HashMap<&'static str, Rc<dyn Any>>>,
    order: RefCell<Vec<&'static str>>,
}

impl std::fmt::Debug for ToolCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCache")
            .field("host_os", &self.host_os)
            .field("host_arch", &self.host_arch)
            .field("data_path", &self.data_path)
            .field("verified", &self.verified_tools())
            .finish()
    }
}

fn discover_host_python(subprocess: &Subprocess) -> PathBuf {
    if let Some(python) = subprocess.env_var(BRIEFCASE_PYTHON) {
        return PathBuf::from(python);
    }
    ["python3", "python"]
        .iter()
        .find_map(|name| which::which(name).ok())
        .unwrap_or_else(|| PathBuf::from("python3"))
}

impl ToolCache {
    pub fn new(console: Console, subprocess: Subprocess, data_path: PathBuf) -> Self {
        let host_python = discover_host_python(&subprocess);
        let home_path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
        debug!(data_path = %data_path.display(), host_python = %host_python.display(), "creating tool cache");
        Self {
            console,
            subprocess,
            host_os: host::host_os().to_string(),
            host_arch: host::host_arch(),
            base_path: data_path.join("tools"),
            data_path,
            home_path,
            host_python,
            tools: RefCell::new(HashMap::new()),
            order: RefCell::new(Vec::new()),
        }
    }

    /// Override the detected host platform
    pub fn with_host(mut self, host_os: impl Into<String>, host_arch: impl Into<String>) -> Self {
        self.host_os = host_os.into();
        self.host_arch = host_arch.into();
        self
    }

    pub fn with_host_python(mut self, python: impl Into<PathBuf>) -> Self {
        self.host_python = python.into();
        self
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home_path = home.into();
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// The verified instance of `T`, if there is one
    pub fn lookup<T: Tool>(&self) -> Option<Rc<T>> {
        let tool = self.tools.borrow().get(T::NAME).cloned()?;
        tool.downcast::<T>().ok()
    }

    /// Record a verified tool; an already attached instance takes precedence
    pub fn attach<T: Tool>(&self, tool: T) -> Rc<T> {
        if let Some(existing) = self.lookup::<T>() {
            return existing;
        }
        debug!(tool = T::NAME, "tool verified");
        let tool = Rc::new(tool);
        self.tools
            .borrow_mut()
            .insert(T::NAME, tool.clone() as Rc<dyn Any>);
        self.order.borrow_mut().push(T::NAME);
        tool
    }

    pub fn is_verified(&self, name: &str) -> bool {
        self.tools.borrow().contains_key(name)
    }

    /// Names of verified tools, in verification order
    pub fn verified_tools(&self) -> Vec<&'static str> {
        self.order.borrow().clone()
    }

    pub fn is_interrupted(&self) -> bool {
        self.subprocess.is_interrupted()
    }
}
