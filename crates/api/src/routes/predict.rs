use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use speechpace_core::dispatch::{PredictRequest, PredictionResponse};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// POST /predict -- run the transcript through the inference script.
///
/// A malformed body (not JSON, not an object, `transcript` not a string) is
/// a 400 carrying the extractor's message. A missing or empty transcript is
/// rejected by the dispatcher before any process is spawned.
async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> AppResult<Json<PredictionResponse>> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected /predict body");
        AppError::BadRequest(rejection.body_text())
    })?;

    let transcript = request.transcript.unwrap_or_default();
    let response = state.dispatcher.predict(&transcript).await?;
    Ok(Json(response))
}

/// OPTIONS /predict -- answered even without CORS preflight headers.
async fn preflight() -> StatusCode {
    StatusCode::OK
}

pub fn router() -> Router<AppState> {
    Router::new().route("/predict", post(predict).options(preflight))
}
