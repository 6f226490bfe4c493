/// Request persistence and the append-only audit trail
///
/// Storage backends persist the request document and its audit entries in
/// one unit of work. Writes are optimistic: a commit names the version it
/// was derived from and fails with `ConcurrentModification` if another
/// writer got there first.

pub mod memory;

pub mod sqlite;

use crate::error::Result;
use crate::workflow::types::{AuditEntry, Request};
use async_trait::async_trait;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Persist a new request together with its creation entry
    async fn insert(&self, request: &Request, created: &AuditEntry) -> Result<()>;

    async fn load(&self, id: &str) -> Result<Option<Request>>;

    /// Replace the stored request if its version still equals
    /// `expected_version`, appending `entry` to the audit trail atomically
    async fn commit(&self, request: &Request, expected_version: u64, entry: &AuditEntry) -> Result<()>;

    /// All requests that have not reached a terminal status
    async fn list_open(&self) -> Result<Vec<Request>>;
}

/// Append-only audit history per request; there is no removal operation
#[async_trait]
pub trait AuditTrail: Send + Sync {
    /// Record `entry` in the trail and in the stored request's own log;
    /// the request moves to its next version
    async fn append(&self, request_id: &str, entry: &AuditEntry) -> Result<()>;

    /// Entries in the order they were appended
    async fn history(&self, request_id: &str) -> Result<Vec<AuditEntry>>;
}

/// A backend providing both request documents and their audit trail
pub trait WorkflowStore: RequestStore + AuditTrail {}

impl<T: RequestStore + AuditTrail> WorkflowStore for T {}
