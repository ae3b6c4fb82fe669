//! Transcript-to-subprocess dispatch.
//!
//! The [`Dispatcher`] owns no I/O of its own: filesystem checks go through a
//! [`ScriptLocator`] and child processes through a [`ProcessLauncher`], so
//! the fallback logic can be exercised without real scripts or interpreters.

pub mod attempt;
pub mod dispatcher;
pub mod launcher;
pub mod locator;
pub mod types;

pub use dispatcher::{DispatchConfig, Dispatcher, FallbackPolicy, DEFAULT_INTERPRETERS};
pub use launcher::{LaunchedProcess, ProcessExit, ProcessLauncher, TokioProcessLauncher};
pub use locator::{FsScriptLocator, ScriptLocator, ScriptPaths, ScriptReport, ScriptSelection};
pub use types::{PredictRequest, PredictionResponse, ScriptPayload, SubprocessResult};
