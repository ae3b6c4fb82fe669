use std::path::PathBuf;

/// Message used for a missing or empty transcript.
pub const TRANSCRIPT_REQUIRED: &str = "Transcript is required";

/// Everything that can end a dispatch without a prediction.
///
/// Variants other than [`DispatchError::Validation`] carry the interpreter
/// command that was in use when the failure became terminal.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("No interpreter commands configured")]
    NoInterpreters,

    #[error("Failed to start `{python_command}`: {source}")]
    Spawn {
        python_command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{python_command}` exited with code {exit_code}: {stderr}")]
    ScriptExecution {
        python_command: String,
        script_path: PathBuf,
        /// `-1` when the process was terminated by a signal.
        exit_code: i32,
        stderr: String,
    },

    #[error("`{python_command}` exited successfully but wrote nothing to stdout")]
    EmptyOutput {
        python_command: String,
        stderr: String,
    },

    #[error("`{python_command}` wrote invalid JSON: {reason}")]
    MalformedOutput {
        python_command: String,
        output: String,
        stderr: String,
        reason: String,
    },

    #[error("`{python_command}` timed out after {elapsed_ms}ms")]
    TimedOut {
        python_command: String,
        script_path: PathBuf,
        elapsed_ms: u64,
        stderr: String,
    },
}

impl DispatchError {
    /// Stable identifier for the error kind, exposed in API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NoInterpreters => "CONFIGURATION_ERROR",
            Self::Spawn { .. } => "SPAWN_ERROR",
            Self::ScriptExecution { .. } => "SCRIPT_EXECUTION_ERROR",
            Self::EmptyOutput { .. } => "EMPTY_OUTPUT",
            Self::MalformedOutput { .. } => "MALFORMED_OUTPUT",
            Self::TimedOut { .. } => "TIMEOUT",
        }
    }

    /// Interpreter command associated with the failure, if any.
    pub fn python_command(&self) -> Option<&str> {
        match self {
            Self::Validation(_) | Self::NoInterpreters => None,
            Self::Spawn { python_command, .. }
            | Self::ScriptExecution { python_command, .. }
            | Self::EmptyOutput { python_command, .. }
            | Self::MalformedOutput { python_command, .. }
            | Self::TimedOut { python_command, .. } => Some(python_command),
        }
    }

    pub(crate) fn transcript_required() -> Self {
        Self::Validation(TRANSCRIPT_REQUIRED.to_string())
    }
}
