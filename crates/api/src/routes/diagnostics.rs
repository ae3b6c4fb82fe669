use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use speechpace_core::dispatch::ScriptReport;

use crate::state::AppState;

/// Environment snapshot returned by `GET /test`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsResponse {
    pub message: &'static str,
    pub version: &'static str,
    pub platform: &'static str,
    pub arch: &'static str,
    /// `None` if the working directory is inaccessible.
    pub cwd: Option<String>,
    #[serde(flatten)]
    pub scripts: ScriptReport,
    pub python_commands: Vec<String>,
    pub script_timeout_secs: u64,
    pub retry_on_bad_output: bool,
}

/// GET /test -- report resolved script paths and whether they exist.
async fn diagnostics(State(state): State<AppState>) -> Json<DiagnosticsResponse> {
    let dispatcher = &state.dispatcher;
    let scripts = dispatcher.config().paths.report(dispatcher.locator());

    Json(DiagnosticsResponse {
        message: "Backend is working!",
        version: env!("CARGO_PKG_VERSION"),
        platform: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        cwd: std::env::current_dir()
            .ok()
            .map(|p| p.display().to_string()),
        scripts,
        python_commands: dispatcher.config().interpreters.clone(),
        script_timeout_secs: state.config.script_timeout_secs,
        retry_on_bad_output: state.config.retry_on_bad_output,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/test", get(diagnostics))
}
