/// Organization directory endpoints

use crate::api::{ApiError, AppState};
use axum::{extract::State, http::StatusCode, response::Json, routing::post, Router};
use serde_json::{json, Value};

pub fn create_directory_routes() -> Router<AppState> {
    Router::new().route("/api/directory/reload", post(reload_directory))
}

/// Re-read the organization document and swap the snapshot
///
/// POST /api/directory/reload
/// Returns: { "contacts": 12 }
///
/// A document that fails to load or validate leaves the current snapshot
/// in place and answers 422.
async fn reload_directory(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    match state.directory.reload() {
        Ok(contacts) => {
            tracing::info!("🔥 Hot-reloaded organization directory ({} contacts)", contacts);
            Ok(Json(json!({ "contacts": contacts })))
        }
        Err(e) => {
            tracing::warn!("⚠️ Directory reload rejected: {:#}", e);
            Err(ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, format!("{:#}", e)))
        }
    }
}
