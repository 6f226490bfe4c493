/// HTTP API Layer
///
/// Thin axum adapter over the workflow engine:
/// - Chain preview and request submission
/// - Decide / escalate / override transitions and audit history
/// - Directory hot reload
/// - Notification delivery counters
///
/// Handlers do no business logic; they translate JSON to engine calls and
/// `WorkflowError` to status codes.

// Request lifecycle endpoints
pub mod requests;

// Organization directory endpoints
pub mod directory;

// Notification delivery counters
pub mod notifications;

use crate::{
    directory::DirectoryRegistry,
    error::WorkflowError,
    runtime::{engine::WorkflowEngine, scheduler::EscalationScheduler},
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Router,
};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;

pub use directory::create_directory_routes;
pub use notifications::create_notification_routes;
pub use requests::create_request_routes;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<WorkflowEngine>,
    pub directory: Arc<DirectoryRegistry>,
    /// Held so the stale-step sweep lives as long as the router
    pub scheduler: Option<Arc<EscalationScheduler>>,
}

/// All API routes
pub fn create_api_routes() -> Router<AppState> {
    Router::new()
        .merge(create_request_routes())
        .merge(create_directory_routes())
        .merge(create_notification_routes())
}

/// Error body returned by every API handler
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        let status = match &err {
            WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
            WorkflowError::ChainResolutionFailure { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            WorkflowError::InvalidTransition(_) => StatusCode::CONFLICT,
            WorkflowError::Forbidden(_) => StatusCode::FORBIDDEN,
            WorkflowError::ConcurrentModification { .. } => StatusCode::CONFLICT,
            WorkflowError::InvariantViolation(_) | WorkflowError::Storage(_) => {
                tracing::error!("Request failed: {}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Run `operation`, retrying exactly once if it lost an optimistic-version race
pub(crate) async fn retry_on_conflict<T, F, Fut>(mut operation: F) -> crate::error::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::error::Result<T>>,
{
    match operation().await {
        Err(WorkflowError::ConcurrentModification { request_id, .. }) => {
            tracing::debug!("🔁 Retrying request {} after concurrent modification", request_id);
            operation().await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn workflow_errors_map_to_status_codes() {
        let cases = [
            (WorkflowError::NotFound("request x".into()), StatusCode::NOT_FOUND),
            (
                WorkflowError::ChainResolutionFailure {
                    requester: "ann@corp.example".into(),
                    category: "leave".into(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (WorkflowError::InvalidTransition("closed".into()), StatusCode::CONFLICT),
            (WorkflowError::Forbidden("employee".into()), StatusCode::FORBIDDEN),
            (
                WorkflowError::ConcurrentModification {
                    request_id: "x".into(),
                    expected_version: 2,
                },
                StatusCode::CONFLICT,
            ),
            (
                WorkflowError::Storage(anyhow::anyhow!("disk full")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[tokio::test]
    async fn conflicts_are_retried_once() {
        let calls = AtomicUsize::new(0);
        let result: crate::error::Result<()> = retry_on_conflict(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(WorkflowError::ConcurrentModification {
                request_id: "x".into(),
                expected_version: 1,
            })
        })
        .await;

        assert!(matches!(result, Err(WorkflowError::ConcurrentModification { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: crate::error::Result<()> = retry_on_conflict(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(WorkflowError::Forbidden("nope".into()))
        })
        .await;

        assert!(matches!(result, Err(WorkflowError::Forbidden(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
