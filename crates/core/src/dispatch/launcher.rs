//! Process launching seam.
//!
//! [`ProcessLauncher`] hides `tokio::process` behind a trait so the
//! dispatcher can be driven by fake processes in tests. A launched process
//! exposes its three stdio streams plus a [`ProcessExit`] handle.

use std::io;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};

pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// A running child process with its stdio taken.
pub struct LaunchedProcess {
    pub stdin: Option<BoxedWriter>,
    pub stdout: Option<BoxedReader>,
    pub stderr: Option<BoxedReader>,
    pub exit: Box<dyn ProcessExit>,
}

/// Exit status half of a [`LaunchedProcess`].
#[async_trait]
pub trait ProcessExit: Send {
    /// Wait for the process to terminate.
    ///
    /// Resolves to `None` when the process was killed by a signal.
    async fn wait(&mut self) -> io::Result<Option<i32>>;

    /// Forcibly terminate the process.
    async fn kill(&mut self) -> io::Result<()>;
}

/// Spawns `<program> <script>` with all three stdio streams piped.
pub trait ProcessLauncher: Send + Sync {
    /// Start the process.
    ///
    /// An error here means the interpreter could not be started at all
    /// (not installed, not executable).
    fn launch(&self, program: &str, script: &Path) -> io::Result<LaunchedProcess>;
}

/// [`ProcessLauncher`] backed by [`tokio::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessLauncher;

impl ProcessLauncher for TokioProcessLauncher {
    fn launch(&self, program: &str, script: &Path) -> io::Result<LaunchedProcess> {
        // `kill_on_drop(true)` ensures the child is killed if the request is dropped.
        let mut child = Command::new(program)
            .arg(script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().map(|s| Box::new(s) as BoxedWriter);
        let stdout = child.stdout.take().map(|s| Box::new(s) as BoxedReader);
        let stderr = child.stderr.take().map(|s| Box::new(s) as BoxedReader);

        Ok(LaunchedProcess {
            stdin,
            stdout,
            stderr,
            exit: Box::new(ChildExit(child)),
        })
    }
}

struct ChildExit(Child);

#[async_trait]
impl ProcessExit for ChildExit {
    async fn wait(&mut self) -> io::Result<Option<i32>> {
        Ok(self.0.wait().await?.code())
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.0.kill().await
    }
}
