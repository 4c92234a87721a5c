//! Streaming the output of a running process

use std::io::{BufRead, BufReader};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use briefcase_core::{BriefcaseError, Result};
use tracing::{debug, warn};

use super::{Popen, Subprocess};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const TERMINATE_TIMEOUT: Duration = Duration::from_secs(3);
const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

/// What a stream filter decided about one line of output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filtered {
    /// Lines to display in place of the input line (possibly none)
    Lines(Vec<String>),
    /// Stop streaming; the line is not displayed
    Stop,
}

/// Per-line transformation applied while streaming
pub trait StreamFilter {
    fn filter(&mut self, line: &str) -> Filtered;
}

impl<F> StreamFilter for F
where
    F: FnMut(&str) -> Filtered,
{
    fn filter(&mut self, line: &str) -> Filtered {
        self(line)
    }
}

impl Subprocess {
    /// Print the output of `popen` until it exits, `stop_func` returns true,
    /// or `filter` asks to stop.
    ///
    /// Lines are read on a dedicated thread. The process is always cleaned up
    /// on the way out and the reader thread is given a bounded time to finish.
    pub fn stream_output(
        &self,
        label: &str,
        popen: &mut Popen,
        stop_func: Option<&dyn Fn() -> bool>,
        mut filter: Option<&mut dyn StreamFilter>,
    ) -> Result<()> {
        let (tx, rx) = mpsc::channel::<String>();
        let reader = popen.take_stdout().map(|stdout| {
            let label = label.to_string();
            thread::spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    match line {
                        Ok(line) => {
                            if tx.send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            debug!(label = %label, error = %e, "output stream closed");
                            break;
                        }
                    }
                }
            })
        });

        let outcome = self.pump_lines(&rx, stop_func, &mut filter);
        if matches!(outcome, Err(BriefcaseError::Interrupted)) {
            self.console().info("Stopping...");
            thread::sleep(Duration::from_millis(250));
        }

        self.cleanup(label, popen);
        drop(rx);

        if let Some(reader) = reader {
            let deadline = Instant::now() + READER_JOIN_TIMEOUT;
            while !reader.is_finished() && Instant::now() < deadline {
                thread::sleep(POLL_INTERVAL);
            }
            if reader.is_finished() {
                let _ = reader.join();
            } else {
                self.console()
                    .error("Log stream hasn't terminated; log output may be corrupted.");
            }
        }

        outcome
    }

    fn pump_lines(
        &self,
        rx: &mpsc::Receiver<String>,
        stop_func: Option<&dyn Fn() -> bool>,
        filter: &mut Option<&mut dyn StreamFilter>,
    ) -> Result<()> {
        loop {
            if self.is_interrupted() {
                return Err(BriefcaseError::Interrupted);
            }
            if stop_func.is_some_and(|stop| stop()) {
                return Ok(());
            }
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => {
                    let lines = match filter {
                        Some(filter) => match filter.filter(&line) {
                            Filtered::Lines(lines) => lines,
                            Filtered::Stop => return Ok(()),
                        },
                        None => vec![line],
                    };
                    for line in lines {
                        self.console().info(line);
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }
    }

    /// Terminate `popen`, killing it if it has not exited after 3 seconds
    pub fn cleanup(&self, label: &str, popen: &mut Popen) {
        if let Err(e) = popen.terminate() {
            debug!(label, error = %e, "unable to terminate process");
        }
        match popen.wait_timeout(TERMINATE_TIMEOUT) {
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => {
                warn!(label, "process did not exit after terminate");
                self.console().warning(format!("Forcibly killing {}...", label));
                if let Err(e) = popen.kill() {
                    debug!(label, error = %e, "unable to kill process");
                }
            }
        }
    }
}
