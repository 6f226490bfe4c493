/// Approval Workflow Layer
///
/// Pure domain logic, no I/O:
/// - Type definitions (ApprovalStep, Request, AuditEntry, Actor)
/// - Chain construction from the organization directory
/// - The request state machine and its invariants
/// - Authorization policy for privileged actions

pub mod types;

pub mod chain;

pub mod events;

pub mod invariants;

pub mod policy;

pub mod transitions;

pub use chain::{ChainBuilder, ChainRecipe, RecipeBook, RoleSelector};
pub use events::{EventKind, WorkflowEvent};
pub use policy::AuthorizationPolicy;
pub use types::{
    Actor, ActorRole, ApprovalStep, AuditAction, AuditEntry, Decision, EscalationTarget, Request,
    RequestDocument, RequestStatus, StepRole, StepStatus,
};
