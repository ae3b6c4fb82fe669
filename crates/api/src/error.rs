use std::any::Any;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use speechpace_core::DispatchError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`DispatchError`] for dispatch failures and adds HTTP-specific
/// variants. Every variant renders as a JSON body with at least `error`
/// and `kind`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

/// JSON 500 body for a handler that panicked, used by `CatchPanicLayer`.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(msg) = err.downcast_ref::<String>() {
        msg.as_str()
    } else if let Some(msg) = err.downcast_ref::<&str>() {
        *msg
    } else {
        "unknown panic payload"
    };
    tracing::error!(details, "Request handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(json!({ "error": "Internal server error", "kind": "INTERNAL_ERROR" })),
    )
        .into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": msg, "kind": "BAD_REQUEST" }),
            ),
            AppError::Dispatch(err) => dispatch_error_body(err),
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Map a [`DispatchError`] to its status code and JSON body.
///
/// Script stderr and stdout are included verbatim so the front end can show
/// why inference failed.
fn dispatch_error_body(err: DispatchError) -> (StatusCode, serde_json::Value) {
    let kind = err.kind();
    match err {
        DispatchError::Validation(msg) => (
            StatusCode::BAD_REQUEST,
            json!({ "error": msg, "kind": kind }),
        ),
        DispatchError::NoInterpreters => {
            tracing::error!("No interpreter commands configured");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "No Python interpreter configured", "kind": kind }),
            )
        }
        DispatchError::Spawn {
            python_command,
            source,
        } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({
                "error": "Failed to start Python process",
                "kind": kind,
                "details": source.to_string(),
                "pythonCommand": python_command,
            }),
        ),
        DispatchError::ScriptExecution {
            python_command,
            script_path,
            exit_code,
            stderr,
        } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({
                "error": "Python script error",
                "kind": kind,
                "details": stderr,
                "code": exit_code,
                "pythonCommand": python_command,
                "scriptPath": script_path.display().to_string(),
            }),
        ),
        DispatchError::EmptyOutput {
            python_command,
            stderr,
        } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({
                "error": "No output from Python script",
                "kind": kind,
                "stderr": stderr,
                "pythonCommand": python_command,
            }),
        ),
        DispatchError::MalformedOutput {
            python_command,
            output,
            stderr,
            reason,
        } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({
                "error": "Invalid Python response",
                "kind": kind,
                "output": output,
                "stderr": stderr,
                "details": reason,
                "pythonCommand": python_command,
            }),
        ),
        DispatchError::TimedOut {
            python_command,
            script_path,
            elapsed_ms,
            stderr,
        } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({
                "error": "Python script timed out",
                "kind": kind,
                "stderr": stderr,
                "elapsedMs": elapsed_ms,
                "pythonCommand": python_command,
                "scriptPath": script_path.display().to_string(),
            }),
        ),
    }
}
