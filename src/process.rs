//! External command execution.
//!
//! Every piece of external work in the pipeline (make, mdconfig, mount)
//! routes through the [`CommandRunner`] capability, so the sequencing logic
//! can be exercised in tests with a scripted runner instead of a real build
//! tool or privileged OS utilities.
//!
//! [`HostRunner`] is the real implementation: it spawns the command, captures
//! combined stdout/stderr, and enforces a hard timeout. A timed-out command
//! is killed and reported the same way as a non-zero exit, carrying whatever
//! output was captured up to that point.

use std::io;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Poll interval while waiting for a child process to exit.
const WAIT_POLL: Duration = Duration::from_millis(50);

/// One external command: program, arguments, working directory, environment
/// overrides and a hard timeout.
#[derive(Debug, Clone)]
pub struct Cmd {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
    pub timeout: Duration,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Cmd {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.display().to_string())
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Outcome of an executed command.
///
/// `output` is the combined stdout/stderr. A timeout is reported with
/// `success = false` exactly like a non-zero exit; `timed_out` only exists
/// for diagnostics.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub success: bool,
    pub timed_out: bool,
    pub output: String,
}

/// Capability to execute external commands.
///
/// `Err` means the command could not be run at all (spawn failure); a
/// command that ran and failed comes back as `Ok` with `success = false`.
pub trait CommandRunner {
    fn run(&self, cmd: &Cmd) -> io::Result<CmdOutput>;
}

/// Runs commands on the host for real.
pub struct HostRunner;

impl CommandRunner for HostRunner {
    fn run(&self, cmd: &Cmd) -> io::Result<CmdOutput> {
        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &cmd.cwd {
            command.current_dir(dir);
        }
        for (key, value) in &cmd.envs {
            command.env(key, value);
        }

        let mut child = command.spawn()?;

        let sink = Arc::new(Mutex::new(Vec::new()));
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, Arc::clone(&sink)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, Arc::clone(&sink)));
        }

        let deadline = Instant::now() + cmd.timeout;
        let mut timed_out = false;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break Some(status);
            }
            if Instant::now() >= deadline {
                timed_out = true;
                let _ = child.kill();
                let _ = child.wait();
                break None;
            }
            thread::sleep(WAIT_POLL);
        };

        // Pipes are closed once the child is gone, so the readers finish.
        for reader in readers {
            let _ = reader.join();
        }

        let captured = match sink.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        Ok(CmdOutput {
            success: status.map(|s| s.success()).unwrap_or(false),
            timed_out,
            output: String::from_utf8_lossy(&captured).into_owned(),
        })
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    mut source: R,
    sink: Arc<Mutex<Vec<u8>>>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match source.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Ok(mut sink) = sink.lock() {
                        sink.extend_from_slice(&buf[..n]);
                    }
                }
            }
        }
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Scripted [`CommandRunner`]: records every invocation and replays
    /// canned outcomes, defaulting to success once the script runs out.
    pub(crate) struct RecordingRunner {
        pub calls: RefCell<Vec<Cmd>>,
        outcomes: RefCell<VecDeque<CmdOutput>>,
    }

    impl RecordingRunner {
        pub fn new() -> Self {
            RecordingRunner {
                calls: RefCell::new(Vec::new()),
                outcomes: RefCell::new(VecDeque::new()),
            }
        }

        pub fn push_success(&self, output: &str) {
            self.push(CmdOutput {
                success: true,
                timed_out: false,
                output: output.to_string(),
            });
        }

        pub fn push_failure(&self, output: &str) {
            self.push(CmdOutput {
                success: false,
                timed_out: false,
                output: output.to_string(),
            });
        }

        pub fn push_timeout(&self, output: &str) {
            self.push(CmdOutput {
                success: false,
                timed_out: true,
                output: output.to_string(),
            });
        }

        pub fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }

        fn push(&self, outcome: CmdOutput) {
            self.outcomes.borrow_mut().push_back(outcome);
        }
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, cmd: &Cmd) -> io::Result<CmdOutput> {
            self.calls.borrow_mut().push(cmd.clone());
            Ok(self.outcomes.borrow_mut().pop_front().unwrap_or(CmdOutput {
                success: true,
                timed_out: false,
                output: String::new(),
            }))
        }
    }
}
