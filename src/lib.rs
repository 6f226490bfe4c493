/// Approvalway: hierarchical approval workflows over an organization directory
///
/// Builds approver chains from reporting lines and per-category recipes,
/// drives requests through decide / escalate / override transitions with an
/// append-only audit trail, and persists them with optimistic concurrency.

// Core configuration and setup
pub mod config;

// Domain error taxonomy
pub mod error;

// Organization directory - immutable snapshots with hot reload
pub mod directory;

// Approval workflow layer - chain construction, state machine, invariants
pub mod workflow;

// Request persistence and audit trail
pub mod storage;

// Engine, notifications and background escalation
pub mod runtime;

// HTTP API layer - thin adapter over the engine
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use directory::{DirectoryRegistry, Identity, OrgDirectory, OrgNode};
pub use error::{Result, WorkflowError};
pub use runtime::WorkflowEngine;
pub use server::start_server;
pub use workflow::{
    Actor, ActorRole, ApprovalStep, ChainBuilder, Decision, EscalationTarget, Request, RequestStatus,
    StepRole, StepStatus,
};
