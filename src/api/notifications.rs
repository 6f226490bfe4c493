/// Notification delivery counters

use crate::{api::AppState, runtime::notifier::DispatchCounts};
use axum::{extract::State, response::Json, routing::get, Router};

pub fn create_notification_routes() -> Router<AppState> {
    Router::new().route("/api/notifications/stats", get(notification_stats))
}

/// GET /api/notifications/stats
/// Returns: { "delivered": 12, "failed": 1, "timed_out": 0 }
async fn notification_stats(State(state): State<AppState>) -> Json<DispatchCounts> {
    Json(state.engine.notifications().stats())
}
