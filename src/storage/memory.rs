/// In-memory workflow store
///
/// Same optimistic-version semantics as the sqlite backend, kept behind a
/// single lock so a commit and its audit append are one step.

use crate::error::{Result, WorkflowError};
use crate::storage::{AuditTrail, RequestStore};
use crate::workflow::types::{AuditEntry, Request};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
    requests: HashMap<String, Request>,
    audit: HashMap<String, Vec<AuditEntry>>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestStore for InMemoryStore {
    async fn insert(&self, request: &Request, created: &AuditEntry) -> Result<()> {
        let mut state = self.state.write().await;
        if state.requests.contains_key(request.id()) {
            return Err(WorkflowError::Storage(anyhow::anyhow!(
                "Request {} already exists",
                request.id()
            )));
        }
        state.requests.insert(request.id().to_string(), request.clone());
        state
            .audit
            .entry(request.id().to_string())
            .or_default()
            .push(created.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Request>> {
        Ok(self.state.read().await.requests.get(id).cloned())
    }

    async fn commit(&self, request: &Request, expected_version: u64, entry: &AuditEntry) -> Result<()> {
        let mut state = self.state.write().await;
        let stored = state
            .requests
            .get_mut(request.id())
            .ok_or_else(|| WorkflowError::NotFound(format!("request {}", request.id())))?;

        if stored.version() != expected_version {
            return Err(WorkflowError::ConcurrentModification {
                request_id: request.id().to_string(),
                expected_version,
            });
        }

        *stored = request.clone();
        state
            .audit
            .entry(request.id().to_string())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn list_open(&self) -> Result<Vec<Request>> {
        Ok(self
            .state
            .read()
            .await
            .requests
            .values()
            .filter(|r| !r.is_terminal())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AuditTrail for InMemoryStore {
    async fn append(&self, request_id: &str, entry: &AuditEntry) -> Result<()> {
        let mut state = self.state.write().await;
        let stored = state
            .requests
            .get_mut(request_id)
            .ok_or_else(|| WorkflowError::NotFound(format!("request {}", request_id)))?;

        // The document's log is part of the request, so it moves to a new version
        stored.record(entry.clone());
        stored.version += 1;

        state
            .audit
            .entry(request_id.to_string())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn history(&self, request_id: &str) -> Result<Vec<AuditEntry>> {
        let state = self.state.read().await;
        if !state.requests.contains_key(request_id) {
            return Err(WorkflowError::NotFound(format!("request {}", request_id)));
        }
        Ok(state.audit.get(request_id).cloned().unwrap_or_default())
    }
}
