//! Test doubles for code that starts processes

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{self, Cursor, Read};
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use briefcase_core::Console;

use crate::cache::ToolCache;
use crate::subprocess::{ChildProcess, Executor, Invocation, Subprocess};

#[derive(Debug, Clone)]
enum Response {
    Exit(i32, String),
    NotFound,
}

#[derive(Debug, Clone)]
struct Rule {
    prefix: Vec<String>,
    response: Response,
    once: bool,
}

/// Executor that records invocations and answers from canned responses.
///
/// Rules match on an argument prefix. The most recently added matching rule
/// wins; `on_once` rules are consumed by their first match. Unmatched calls
/// succeed with no output.
#[derive(Debug, Default)]
pub struct FakeExecutor {
    rules: RefCell<Vec<Rule>>,
    calls: RefCell<Vec<Invocation>>,
}

impl FakeExecutor {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    fn add(&self, prefix: &[&str], response: Response, once: bool) {
        self.rules.borrow_mut().push(Rule {
            prefix: prefix.iter().map(|s| s.to_string()).collect(),
            response,
            once,
        });
    }

    pub fn on(&self, prefix: &[&str], code: i32, output: &str) {
        self.add(prefix, Response::Exit(code, output.to_string()), false);
    }

    pub fn on_once(&self, prefix: &[&str], code: i32, output: &str) {
        self.add(prefix, Response::Exit(code, output.to_string()), true);
    }

    /// Calls starting with `prefix` fail as if the executable does not exist
    pub fn missing(&self, prefix: &[&str]) {
        self.add(prefix, Response::NotFound, false);
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    /// Recorded command lines, joined with spaces
    pub fn commands(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.args.join(" ")).collect()
    }

    fn respond(&self, invocation: &Invocation) -> io::Result<(i32, String)> {
        self.calls.borrow_mut().push(invocation.clone());

        let mut rules = self.rules.borrow_mut();
        let matched = rules.iter().rposition(|rule| {
            rule.prefix.len() <= invocation.args.len()
                && rule.prefix.iter().zip(&invocation.args).all(|(a, b)| a == b)
        });
        let response = match matched {
            Some(index) if rules[index].once => rules.remove(index).response,
            Some(index) => rules[index].response.clone(),
            None => Response::Exit(0, String::new()),
        };

        match response {
            Response::Exit(code, output) => Ok((code, output)),
            Response::NotFound => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", invocation.args[0]),
            )),
        }
    }
}

impl Executor for FakeExecutor {
    fn status(&self, invocation: &Invocation) -> io::Result<i32> {
        Ok(self.respond(invocation)?.0)
    }

    fn output(&self, invocation: &Invocation) -> io::Result<(i32, String)> {
        self.respond(invocation)
    }

    fn spawn(&self, invocation: &Invocation) -> io::Result<Box<dyn ChildProcess>> {
        let (code, output) = self.respond(invocation)?;
        Ok(Box::new(FakeChild {
            code,
            stdout: Some(output),
        }))
    }
}

/// A process that has already produced all of its output
struct FakeChild {
    code: i32,
    stdout: Option<String>,
}

impl ChildProcess for FakeChild {
    fn pid(&self) -> u32 {
        4242
    }

    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>> {
        self.stdout
            .take()
            .map(|output| Box::new(Cursor::new(output.into_bytes())) as Box<dyn Read + Send>)
    }

    fn try_wait(&mut self) -> io::Result<Option<i32>> {
        Ok(Some(self.code))
    }

    fn wait(&mut self) -> io::Result<i32> {
        Ok(self.code)
    }

    fn terminate(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Behave as if the user pressed Ctrl-C
pub fn interrupt(subprocess: &Subprocess) {
    subprocess.interrupt_flag().store(true, Ordering::SeqCst);
}

/// Subprocess facade over `executor` with a minimal host environment
pub fn fake_subprocess(executor: &Rc<FakeExecutor>) -> Subprocess {
    let mut env = BTreeMap::new();
    env.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
    Subprocess::with_executor(
        Console::silent(),
        executor.clone(),
        env,
        Arc::new(AtomicBool::new(false)),
    )
}

/// Tool cache rooted at `data_path`, pretending to run on `host_os`
pub fn fake_tool_cache(data_path: &Path, host_os: &str) -> (ToolCache, Rc<FakeExecutor>) {
    let executor = FakeExecutor::new();
    let host_arch = if host_os == "Darwin" { "arm64" } else { "x86_64" };
    let tools = ToolCache::new(Console::silent(), fake_subprocess(&executor), data_path.to_path_buf())
        .with_host(host_os, host_arch)
        .with_host_python(data_path.join("host").join("python3"))
        .with_home(data_path.join("home"));
    (tools, executor)
}
