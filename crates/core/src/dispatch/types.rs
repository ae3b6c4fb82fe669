//! Wire types shared by the dispatcher and the HTTP layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /predict`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    pub transcript: Option<String>,
}

/// JSON object written to the inference script's stdin.
#[derive(Debug, Serialize)]
pub struct ScriptPayload<'a> {
    pub transcript: &'a str,
}

/// Successful prediction relayed back to the caller.
///
/// `prediction` and `debug_info` are passed through exactly as the script
/// emitted them. A key the script did not emit is left out of the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<Value>,
    #[serde(rename = "pythonCommand")]
    pub python_command: String,
}

impl PredictionResponse {
    /// Build a response from the script's parsed stdout.
    ///
    /// Non-object output yields neither field.
    pub fn from_script_output(output: &Value, python_command: &str) -> Self {
        Self {
            prediction: output.get("prediction").cloned(),
            debug_info: output.get("debug_info").cloned(),
            python_command: python_command.to_string(),
        }
    }
}

/// Output of one finished child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubprocessResult {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl SubprocessResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}
