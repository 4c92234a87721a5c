//! Process spawning backends

use std::collections::BTreeMap;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};

/// A fully resolved command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Complete environment for the child; nothing is inherited implicitly
    pub env: BTreeMap<String, String>,
}

/// Something that can start processes
pub trait Executor {
    /// Run with inherited stdio and return the exit code
    fn status(&self, invocation: &Invocation) -> io::Result<i32>;

    /// Run to completion, capturing stdout and stderr as one stream
    fn output(&self, invocation: &Invocation) -> io::Result<(i32, String)>;

    /// Start the process with stdout and stderr merged into one pipe
    fn spawn(&self, invocation: &Invocation) -> io::Result<Box<dyn ChildProcess>>;
}

/// A started process
pub trait ChildProcess {
    fn pid(&self) -> u32;
    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>>;
    fn try_wait(&mut self) -> io::Result<Option<i32>>;
    fn wait(&mut self) -> io::Result<i32>;
    fn terminate(&mut self) -> io::Result<()>;
    fn kill(&mut self) -> io::Result<()>;
}

/// Executor backed by `std::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct HostExecutor;

impl HostExecutor {
    fn command(invocation: &Invocation) -> Command {
        let mut cmd = Command::new(&invocation.args[0]);
        cmd.args(&invocation.args[1..])
            .env_clear()
            .envs(&invocation.env);
        if let Some(cwd) = &invocation.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }

    /// Route stdout and stderr into a single pipe, returning its read end
    fn merge_output(cmd: &mut Command) -> io::Result<io::PipeReader> {
        let (reader, writer) = io::pipe()?;
        cmd.stdout(writer.try_clone()?).stderr(writer);
        Ok(reader)
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

impl Executor for HostExecutor {
    fn status(&self, invocation: &Invocation) -> io::Result<i32> {
        let status = Self::command(invocation).stdin(Stdio::inherit()).status()?;
        Ok(exit_code(status))
    }

    fn output(&self, invocation: &Invocation) -> io::Result<(i32, String)> {
        let mut cmd = Self::command(invocation);
        cmd.stdin(Stdio::null());
        let mut reader = Self::merge_output(&mut cmd)?;
        let mut child = cmd.spawn()?;
        // The parent's copies of the write end must close before reading to EOF
        drop(cmd);

        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        let status = child.wait()?;
        Ok((exit_code(status), String::from_utf8_lossy(&buf).into_owned()))
    }

    fn spawn(&self, invocation: &Invocation) -> io::Result<Box<dyn ChildProcess>> {
        let mut cmd = Self::command(invocation);
        cmd.stdin(Stdio::null());
        let reader = Self::merge_output(&mut cmd)?;
        let child = cmd.spawn()?;
        drop(cmd);
        Ok(Box::new(HostChild {
            child,
            stdout: Some(Box::new(reader)),
        }))
    }
}

struct HostChild {
    child: Child,
    stdout: Option<Box<dyn Read + Send>>,
}

impl ChildProcess for HostChild {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>> {
        self.stdout.take()
    }

    fn try_wait(&mut self) -> io::Result<Option<i32>> {
        Ok(self.child.try_wait()?.map(exit_code))
    }

    fn wait(&mut self) -> io::Result<i32> {
        Ok(exit_code(self.child.wait()?))
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        let pid = libc::pid_t::try_from(self.child.id())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        // SAFETY: kill(2) has no memory-safety preconditions
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            Ok(())
        } else {
            Err(err)
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        self.child.kill()
    }

    fn kill(&mut self) -> io::Result<()> {
        match self.child.kill() {
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            other => other,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn invocation(args: &[&str]) -> Invocation {
        let mut env = BTreeMap::new();
        if let Ok(path) = std::env::var("PATH") {
            env.insert("PATH".to_string(), path);
        }
        Invocation {
            args: args.iter().map(|s| s.to_string()).collect(),
            cwd: None,
            env,
        }
    }

    #[test]
    fn test_output_merges_streams() {
        let (code, output) = HostExecutor
            .output(&invocation(&["sh", "-c", "echo out; echo err 1>&2; exit 3"]))
            .unwrap();
        assert_eq!(code, 3);
        assert!(output.contains("out"));
        assert!(output.contains("err"));
    }

    #[test]
    fn test_missing_executable_is_not_found() {
        let err = HostExecutor
            .output(&invocation(&["definitely-not-a-real-binary-xyz"]))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_terminate_reports_signal() {
        let mut child = HostExecutor.spawn(&invocation(&["sleep", "30"])).unwrap();
        child.terminate().unwrap();
        assert_eq!(child.wait().unwrap(), -libc::SIGTERM);
    }
}
