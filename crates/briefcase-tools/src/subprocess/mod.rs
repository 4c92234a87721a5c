//! Subprocess execution
//!
//! Every process briefcase starts goes through [`Subprocess`]. It merges the
//! caller's environment overrides onto the host environment, logs the command
//! line, streams or captures output, and turns non-zero exits into
//! [`CalledProcessError`]s when asked to check them.

mod executor;
mod stream;

use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use briefcase_core::{BriefcaseError, CalledProcessError, Console, Result};
use tracing::debug;

pub use executor::{ChildProcess, Executor, HostExecutor, Invocation};
pub use stream::{Filtered, StreamFilter};

/// Options for a single subprocess call.
///
/// Execution contexts never modify the options they are given; they build a
/// new value for the outgoing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubprocessOptions {
    /// Working directory for the process
    pub cwd: Option<PathBuf>,
    /// Environment overrides; `None` removes the variable
    pub env: BTreeMap<String, Option<String>>,
    /// Turn a non-zero exit into an error
    pub check: bool,
    /// Print output line by line as it is produced
    pub stream_output: bool,
    /// Attach the process to the user's terminal
    pub interactive: bool,
    /// Keep the command line out of the console
    pub quiet: bool,
}

impl Default for SubprocessOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            env: BTreeMap::new(),
            check: true,
            stream_output: true,
            interactive: false,
            quiet: false,
        }
    }
}

impl SubprocessOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), Some(value.into()));
        self
    }

    pub fn remove_env(mut self, key: impl Into<String>) -> Self {
        self.env.insert(key.into(), None);
        self
    }

    pub fn no_check(mut self) -> Self {
        self.check = false;
        self
    }

    pub fn no_stream(mut self) -> Self {
        self.stream_output = false;
        self
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }
}

/// Outcome of a completed `run`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedProcess {
    pub args: Vec<String>,
    pub returncode: i32,
}

/// Build an owned argument list from anything string-like
#[macro_export]
macro_rules! cmd_args {
    ($($arg:expr),* $(,)?) => {
        vec![$(::std::string::ToString::to_string(&$arg)),*]
    };
}

/// Render a path as a command-line argument
pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Handle to a running child process
pub struct Popen {
    args: Vec<String>,
    child: Box<dyn ChildProcess>,
    returncode: Option<i32>,
}

impl Popen {
    pub fn new(args: Vec<String>, child: Box<dyn ChildProcess>) -> Self {
        Self {
            args,
            child,
            returncode: None,
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn pid(&self) -> u32 {
        self.child.pid()
    }

    /// Exit status, once the process has been observed to exit
    pub fn returncode(&self) -> Option<i32> {
        self.returncode
    }

    /// Take the merged stdout/stderr stream
    pub fn take_stdout(&mut self) -> Option<Box<dyn io::Read + Send>> {
        self.child.take_stdout()
    }

    /// Check for exit without blocking
    pub fn poll(&mut self) -> io::Result<Option<i32>> {
        if self.returncode.is_none() {
            self.returncode = self.child.try_wait()?;
        }
        Ok(self.returncode)
    }

    pub fn wait(&mut self) -> io::Result<i32> {
        if let Some(code) = self.returncode {
            return Ok(code);
        }
        let code = self.child.wait()?;
        self.returncode = Some(code);
        Ok(code)
    }

    /// Wait for exit, giving up after `timeout`
    pub fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<i32>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(code) = self.poll()? {
                return Ok(Some(code));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    /// Ask the process to exit (SIGTERM on unix)
    pub fn terminate(&mut self) -> io::Result<()> {
        if self.poll()?.is_some() {
            return Ok(());
        }
        self.child.terminate()
    }

    pub fn kill(&mut self) -> io::Result<()> {
        if self.poll()?.is_some() {
            return Ok(());
        }
        self.child.kill()
    }
}

impl std::fmt::Debug for Popen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Popen")
            .field("args", &self.args)
            .field("returncode", &self.returncode)
            .finish()
    }
}

/// Process-creation facade shared by the tool cache and execution contexts
#[derive(Clone)]
pub struct Subprocess {
    executor: Rc<dyn Executor>,
    console: Console,
    base_env: BTreeMap<String, String>,
    interrupted: Arc<AtomicBool>,
}

impl std::fmt::Debug for Subprocess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subprocess")
            .field("env_vars", &self.base_env.len())
            .finish()
    }
}

impl Subprocess {
    /// Subprocess facade over the real host, inheriting this process's environment
    pub fn new(console: Console, interrupted: Arc<AtomicBool>) -> Self {
        let base_env = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self::with_executor(console, Rc::new(HostExecutor), base_env, interrupted)
    }

    pub fn with_executor(
        console: Console,
        executor: Rc<dyn Executor>,
        base_env: BTreeMap<String, String>,
        interrupted: Arc<AtomicBool>,
    ) -> Self {
        Self {
            executor,
            console,
            base_env,
            interrupted,
        }
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    /// Value of a variable in the host environment
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.base_env.get(key).map(String::as_str)
    }

    /// Whether the user has asked the process to stop
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Clear a pending interrupt, returning whether there was one.
    ///
    /// For callers that treat Ctrl-C as the normal way to end what they were
    /// doing and still need to start processes to tidy up afterwards.
    pub fn acknowledge_interrupt(&self) -> bool {
        self.interrupted.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn interrupt_flag(&self) -> &Arc<AtomicBool> {
        &self.interrupted
    }

    /// Host environment with `overrides` applied; `None` values remove keys
    pub fn full_env(&self, overrides: &BTreeMap<String, Option<String>>) -> BTreeMap<String, String> {
        let mut env = self.base_env.clone();
        for (key, value) in overrides {
            match value {
                Some(value) => {
                    env.insert(key.clone(), value.clone());
                }
                None => {
                    env.remove(key);
                }
            }
        }
        env
    }

    fn invocation(&self, args: &[String], options: &SubprocessOptions) -> Result<Invocation> {
        if args.is_empty() {
            return Err(BriefcaseError::command("Unable to run an empty command."));
        }
        if self.is_interrupted() {
            debug!(command = %args.join(" "), "not starting subprocess after interrupt");
            return Err(BriefcaseError::Interrupted);
        }
        let invocation = Invocation {
            args: args.to_vec(),
            cwd: options.cwd.clone(),
            env: self.full_env(&options.env),
        };
        self.log_invocation(&invocation, options);
        Ok(invocation)
    }

    fn log_invocation(&self, invocation: &Invocation, options: &SubprocessOptions) {
        debug!(
            command = %invocation.args.join(" "),
            cwd = ?invocation.cwd,
            "running subprocess"
        );
        if options.quiet {
            return;
        }
        self.console.debug(format!(">>> Running Command:\n>>>     {}", invocation.args.join(" ")));
        if let Some(cwd) = &invocation.cwd {
            self.console.debug(format!(">>> Working Directory:\n>>>     {}", cwd.display()));
        }
        if !options.env.is_empty() {
            self.console.debug(">>> Environment Overrides:");
            for (key, value) in &options.env {
                self.console
                    .debug(format!(">>>     {}={}", key, value.as_deref().unwrap_or("<unset>")));
            }
        }
    }

    fn check(&self, args: &[String], returncode: i32, output: Option<String>) -> Result<()> {
        if returncode == 0 {
            return Ok(());
        }
        let mut err = CalledProcessError::new(args, returncode);
        if let Some(output) = output {
            err = err.with_output(output);
        }
        Err(err.into())
    }

    /// Run a command to completion.
    ///
    /// With `stream_output` the merged output is printed line by line;
    /// `interactive` attaches the process to the terminal instead.
    pub fn run(&self, args: &[String], options: &SubprocessOptions) -> Result<CompletedProcess> {
        let invocation = self.invocation(args, options)?;

        let returncode = if options.stream_output && !options.interactive {
            let child = self.executor.spawn(&invocation)?;
            let mut popen = Popen::new(invocation.args, child);
            self.print_until_exit(&mut popen)?
        } else {
            self.executor.status(&invocation)?
        };

        if self.is_interrupted() {
            return Err(BriefcaseError::Interrupted);
        }
        debug!(returncode, "subprocess completed");
        if options.check {
            self.check(args, returncode, None)?;
        }
        Ok(CompletedProcess {
            args: args.to_vec(),
            returncode,
        })
    }

    fn print_until_exit(&self, popen: &mut Popen) -> Result<i32> {
        if let Some(stdout) = popen.take_stdout() {
            for line in BufReader::new(stdout).lines() {
                match line {
                    Ok(line) => self.console.info(line),
                    Err(e) => {
                        debug!(error = %e, "output stream closed");
                        break;
                    }
                }
            }
        }
        Ok(popen.wait()?)
    }

    /// Run a command and return its merged output; non-zero exits are errors
    pub fn check_output(&self, args: &[String], options: &SubprocessOptions) -> Result<String> {
        let invocation = self.invocation(args, options)?;
        let (returncode, output) = self.executor.output(&invocation)?;
        if !options.quiet {
            self.console.debug(format!(">>> Return code: {}", returncode));
        }
        self.check(args, returncode, Some(output.clone()))?;
        Ok(output)
    }

    /// Start a command without waiting for it
    pub fn popen(&self, args: &[String], options: &SubprocessOptions) -> Result<Popen> {
        let invocation = self.invocation(args, options)?;
        let child = self.executor.spawn(&invocation)?;
        Ok(Popen::new(invocation.args, child))
    }

    /// Run a command and parse its output with `parser`
    pub fn parse_output<T>(
        &self,
        parser: impl FnOnce(&str) -> std::result::Result<T, String>,
        args: &[String],
        options: &SubprocessOptions,
    ) -> Result<T> {
        let output = self.check_output(args, options)?;
        parser(&output).map_err(BriefcaseError::CommandOutputParse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeExecutor;

    fn subprocess(executor: &Rc<FakeExecutor>) -> Subprocess {
        let mut env = BTreeMap::new();
        env.insert("PATH".to_string(), "/usr/bin".to_string());
        env.insert("HOME".to_string(), "/home/user".to_string());
        Subprocess::with_executor(
            Console::silent(),
            executor.clone(),
            env,
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[test]
    fn test_full_env_applies_and_removes() {
        let executor = FakeExecutor::new();
        let sub = subprocess(&executor);
        let options = SubprocessOptions::new().env("EXTRA", "1").remove_env("HOME");

        let env = sub.full_env(&options.env);
        assert_eq!(env.get("EXTRA").map(String::as_str), Some("1"));
        assert_eq!(env.get("PATH").map(String::as_str), Some("/usr/bin"));
        assert!(!env.contains_key("HOME"));
    }

    #[test]
    fn test_run_checks_returncode() {
        let executor = FakeExecutor::new();
        executor.on(&["false"], 1, "");
        let sub = subprocess(&executor);

        let err = sub.run(&cmd_args!["false"], &SubprocessOptions::new()).unwrap_err();
        assert!(matches!(
            err,
            BriefcaseError::Process(CalledProcessError { returncode: 1, .. })
        ));

        let done = sub
            .run(&cmd_args!["false"], &SubprocessOptions::new().no_check())
            .unwrap();
        assert_eq!(done.returncode, 1);
    }

    #[test]
    fn test_run_passes_cwd_and_env() {
        let executor = FakeExecutor::new();
        let sub = subprocess(&executor);
        sub.run(
            &cmd_args!["tool", "arg"],
            &SubprocessOptions::new().cwd("/work").env("KEY", "value").no_stream(),
        )
        .unwrap();

        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args, cmd_args!["tool", "arg"]);
        assert_eq!(calls[0].cwd, Some(PathBuf::from("/work")));
        assert_eq!(calls[0].env.get("KEY").map(String::as_str), Some("value"));
    }

    #[test]
    fn test_check_output_attaches_output_on_failure() {
        let executor = FakeExecutor::new();
        executor.on(&["tool"], 3, "broken\n");
        let sub = subprocess(&executor);

        match sub.check_output(&cmd_args!["tool"], &SubprocessOptions::new()) {
            Err(BriefcaseError::Process(err)) => {
                assert_eq!(err.returncode, 3);
                assert_eq!(err.output.as_deref(), Some("broken\n"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_output() {
        let executor = FakeExecutor::new();
        executor.on(&["tool", "--version"], 0, "tool 1.2\n");
        let sub = subprocess(&executor);

        let version = sub
            .parse_output(
                |out| out.trim().strip_prefix("tool ").map(str::to_string).ok_or_else(|| out.to_string()),
                &cmd_args!["tool", "--version"],
                &SubprocessOptions::new(),
            )
            .unwrap();
        assert_eq!(version, "1.2");

        let err = sub
            .parse_output(
                |_| Err::<(), _>("no version".to_string()),
                &cmd_args!["tool", "--version"],
                &SubprocessOptions::new(),
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "Unable to parse command output: no version");
    }

    #[test]
    fn test_empty_command_rejected() {
        let executor = FakeExecutor::new();
        let sub = subprocess(&executor);
        assert!(sub.run(&[], &SubprocessOptions::new()).is_err());
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn test_nothing_starts_after_interrupt() {
        let executor = FakeExecutor::new();
        let flag = Arc::new(AtomicBool::new(true));
        let sub = Subprocess::with_executor(Console::silent(), executor.clone(), BTreeMap::new(), flag);

        let err = sub.run(&cmd_args!["sleep", "10"], &SubprocessOptions::new()).unwrap_err();
        assert!(err.is_interrupt());
        let err = sub
            .check_output(&cmd_args!["git", "--version"], &SubprocessOptions::new())
            .unwrap_err();
        assert!(err.is_interrupt());
        let err = sub.popen(&cmd_args!["app"], &SubprocessOptions::new()).unwrap_err();
        assert!(err.is_interrupt());

        assert!(executor.calls().is_empty());
    }

    #[test]
    fn test_interrupt_between_commands_stops_the_sequence() {
        let executor = FakeExecutor::new();
        let flag = Arc::new(AtomicBool::new(false));
        let sub = Subprocess::with_executor(Console::silent(), executor.clone(), BTreeMap::new(), flag.clone());

        sub.run(&cmd_args!["git", "--version"], &SubprocessOptions::new()).unwrap();
        flag.store(true, Ordering::SeqCst);
        let err = sub.run(&cmd_args!["pip", "install"], &SubprocessOptions::new()).unwrap_err();

        assert!(err.is_interrupt());
        assert_eq!(executor.commands(), vec!["git --version"]);
    }

    #[test]
    fn test_acknowledged_interrupt_allows_new_processes() {
        let executor = FakeExecutor::new();
        let flag = Arc::new(AtomicBool::new(true));
        let sub = Subprocess::with_executor(Console::silent(), executor.clone(), BTreeMap::new(), flag);

        assert!(sub.acknowledge_interrupt());
        assert!(!sub.acknowledge_interrupt());
        assert!(!sub.is_interrupted());
        sub.run(&cmd_args!["kill", "4242"], &SubprocessOptions::new()).unwrap();
        assert_eq!(executor.commands(), vec!["kill 4242"]);
    }
}
