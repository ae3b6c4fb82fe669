pub mod diagnostics;
pub mod health;
pub mod predict;

use axum::Router;

use crate::state::AppState;

/// Build the route tree.
///
/// ```text
/// /health      GET      liveness probe
/// /predict     POST     run a transcript through the inference script
///              OPTIONS  preflight
/// /test        GET      diagnostic snapshot
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(predict::router())
        .merge(diagnostics::router())
}
