//! Test-only fake launcher and locator.
//!
//! [`MockLauncher`] answers each interpreter name with a scripted
//! [`MockBehavior`] and records every launch, the script path it was given,
//! and the bytes written to its stdin.

use std::collections::{HashMap, HashSet};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, DuplexStream};

use crate::dispatch::launcher::{
    BoxedReader, BoxedWriter, LaunchedProcess, ProcessExit, ProcessLauncher,
};
use crate::dispatch::locator::ScriptLocator;

const STDIN_CAPACITY: usize = 1024 * 1024;

/// What a fake interpreter does when launched.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// The interpreter cannot be started.
    SpawnFails,
    /// The process writes the given output and exits.
    Exits {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    /// The process writes `stderr` and never exits on its own.
    Hangs { stderr: String },
}

impl MockBehavior {
    pub fn exits(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::Exits {
            code: Some(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Exit 0 with `stdout` and no stderr.
    pub fn succeeds(stdout: impl Into<String>) -> Self {
        Self::exits(0, stdout, "")
    }

    /// Terminated by a signal (no exit code).
    pub fn killed(stderr: impl Into<String>) -> Self {
        Self::Exits {
            code: None,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// One recorded call to [`ProcessLauncher::launch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub program: String,
    pub script: PathBuf,
}

/// Scripted [`ProcessLauncher`]. Programs without a behavior fail to spawn.
#[derive(Debug, Clone, Default)]
pub struct MockLauncher {
    behaviors: HashMap<String, MockBehavior>,
    launches: Arc<Mutex<Vec<Launch>>>,
    stdin_sinks: Arc<Mutex<Vec<DuplexStream>>>,
    kills: Arc<AtomicUsize>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on(mut self, program: &str, behavior: MockBehavior) -> Self {
        self.behaviors.insert(program.to_string(), behavior);
        self
    }

    /// Every launch attempt so far, including ones that failed to spawn.
    pub fn launches(&self) -> Vec<Launch> {
        self.launches.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn launched_programs(&self) -> Vec<String> {
        self.launches().into_iter().map(|l| l.program).collect()
    }

    /// Number of processes killed after a timeout.
    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    /// Drain and return what was written to each spawned process's stdin.
    ///
    /// Call only after the dispatch has finished, otherwise this waits for
    /// the writer to close.
    pub async fn stdin_payloads(&self) -> Vec<String> {
        let sinks: Vec<DuplexStream> = self
            .stdin_sinks
            .lock()
            .map(|mut s| s.drain(..).collect())
            .unwrap_or_default();

        let mut payloads = Vec::with_capacity(sinks.len());
        for mut sink in sinks {
            let mut buf = String::new();
            let _ = sink.read_to_string(&mut buf).await;
            payloads.push(buf);
        }
        payloads
    }
}

impl ProcessLauncher for MockLauncher {
    fn launch(&self, program: &str, script: &Path) -> io::Result<LaunchedProcess> {
        if let Ok(mut launches) = self.launches.lock() {
            launches.push(Launch {
                program: program.to_string(),
                script: script.to_path_buf(),
            });
        }

        let behavior = self
            .behaviors
            .get(program)
            .cloned()
            .unwrap_or(MockBehavior::SpawnFails);

        let (code, stdout, stderr, hangs) = match behavior {
            MockBehavior::SpawnFails => {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{program}: command not found"),
                ));
            }
            MockBehavior::Exits {
                code,
                stdout,
                stderr,
            } => (code, stdout, stderr, false),
            MockBehavior::Hangs { stderr } => (None, String::new(), stderr, true),
        };

        let (writer, reader) = tokio::io::duplex(STDIN_CAPACITY);
        if let Ok(mut sinks) = self.stdin_sinks.lock() {
            sinks.push(reader);
        }

        Ok(LaunchedProcess {
            stdin: Some(Box::new(writer) as BoxedWriter),
            stdout: Some(Box::new(Cursor::new(stdout.into_bytes())) as BoxedReader),
            stderr: Some(Box::new(Cursor::new(stderr.into_bytes())) as BoxedReader),
            exit: Box::new(MockExit {
                code,
                hangs,
                kills: Arc::clone(&self.kills),
            }),
        })
    }
}

struct MockExit {
    code: Option<i32>,
    hangs: bool,
    kills: Arc<AtomicUsize>,
}

#[async_trait]
impl ProcessExit for MockExit {
    async fn wait(&mut self) -> io::Result<Option<i32>> {
        if self.hangs {
            std::future::pending::<()>().await;
        }
        Ok(self.code)
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// [`ScriptLocator`] over a fixed set of paths.
#[derive(Debug, Clone, Default)]
pub struct MockLocator {
    existing: HashSet<PathBuf>,
}

impl MockLocator {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            existing: paths.into_iter().collect(),
        }
    }
}

impl ScriptLocator for MockLocator {
    fn exists(&self, path: &Path) -> bool {
        self.existing.contains(path)
    }
}
