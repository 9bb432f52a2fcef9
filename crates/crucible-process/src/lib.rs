//! Child-process plumbing for the pipeline.
//!
//! Spawns an external program, drains its output streams, enforces a
//! timeout and can take down the whole process tree. Knows nothing about
//! roles or build semantics.

use crucible_core::{CrucibleError, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

/// Grace period for draining output after the child has exited or been
/// killed. A reader hung on a pipe held open by an orphaned grandchild
/// must not hang the caller.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Describes one child-process invocation.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// `None` leaves the child unbounded.
    pub timeout: Option<Duration>,
    /// When false, the child runs console-attached: stdin and stdout are
    /// inherited so console-handle APIs work, and only stderr is still
    /// piped for failure-signature scanning.
    pub capture: bool,
    /// Kill the child's entire process group on timeout, not just the
    /// immediate child.
    pub kill_tree: bool,
}

impl ProcessRequest {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout: None,
            capture: true,
            kill_tree: false,
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

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    pub fn kill_tree(mut self, kill_tree: bool) -> Self {
        self.kill_tree = kill_tree;
        self
    }
}

/// How the child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDisposition {
    /// The child exited on its own with this code.
    Exited(i32),
    /// The timeout expired and the child was killed.
    TimedOut,
}

/// Captured outcome of a child-process invocation.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub disposition: ExitDisposition,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn exit_code(&self) -> Option<i32> {
        match self.disposition {
            ExitDisposition::Exited(code) => Some(code),
            ExitDisposition::TimedOut => None,
        }
    }

    pub fn timed_out(&self) -> bool {
        self.disposition == ExitDisposition::TimedOut
    }

    pub fn success(&self) -> bool {
        self.disposition == ExitDisposition::Exited(0)
    }
}

/// Spawns and supervises child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Runs the requested program to completion or timeout.
    pub async fn run(&self, request: ProcessRequest) -> Result<ProcessOutput> {
        let started = Instant::now();
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args);
        if let Some(dir) = &request.cwd {
            cmd.current_dir(dir);
        }
        if request.capture {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        } else {
            cmd.stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::piped());
        }
        #[cfg(unix)]
        if request.kill_tree {
            // Own process group so the whole tree can be signalled at once.
            cmd.process_group(0);
        }

        tracing::debug!(program = %request.program, args = ?request.args, "spawning process");
        let mut child = cmd.spawn().map_err(|e| {
            CrucibleError::execution(format!("failed to spawn '{}': {}", request.program, e))
        })?;

        let stdout_task = child.stdout.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf).await;
                buf
            })
        });
        let stderr_task = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf).await;
                buf
            })
        });

        let disposition = match request.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => ExitDisposition::Exited(status?.code().unwrap_or(-1)),
                Err(_) => {
                    tracing::warn!(
                        program = %request.program,
                        timeout_secs = limit.as_secs_f64(),
                        "process timed out, killing"
                    );
                    self.kill(&mut child, request.kill_tree).await;
                    ExitDisposition::TimedOut
                }
            },
            None => ExitDisposition::Exited(child.wait().await?.code().unwrap_or(-1)),
        };

        let stdout = drain(stdout_task).await;
        let stderr = drain(stderr_task).await;

        Ok(ProcessOutput {
            disposition,
            stdout,
            stderr,
            duration: started.elapsed(),
        })
    }

    /// Kills the child, and its process group when requested. Failures are
    /// logged but never surfaced: the child may already be gone.
    async fn kill(&self, child: &mut Child, kill_tree: bool) {
        #[cfg(unix)]
        if kill_tree {
            if let Some(pid) = child.id() {
                // The child is its own group leader (process_group(0) at
                // spawn), so a negative pid signals the whole tree.
                let result = std::process::Command::new("kill")
                    .arg("-KILL")
                    .arg("--")
                    .arg(format!("-{pid}"))
                    .status();
                if let Err(e) = result {
                    tracing::debug!("process-group kill failed: {}", e);
                }
            }
        }
        #[cfg(not(unix))]
        let _ = kill_tree;
        if let Err(e) = child.start_kill() {
            tracing::debug!("kill failed (process likely already exited): {}", e);
        }
        let _ = child.wait().await;
    }
}

/// Awaits a stream-reader task with failures suppressed.
async fn drain(task: Option<tokio::task::JoinHandle<Vec<u8>>>) -> String {
    let Some(task) = task else {
        return String::new();
    };
    match tokio::time::timeout(DRAIN_GRACE, task).await {
        Ok(Ok(buf)) => String::from_utf8_lossy(&buf).into_owned(),
        Ok(Err(_)) => String::new(),
        Err(_) => String::new(),
    }
}
