/// Runtime Layer
///
/// Everything that touches time, tasks and shared state:
/// - The workflow engine (per-request serialization + optimistic commits)
/// - Best-effort notification fan-out
/// - Cron-driven auto-escalation of stale steps

pub mod engine;

pub mod locks;

pub mod notifier;

pub mod scheduler;

pub use engine::WorkflowEngine;
pub use notifier::{LogNotifier, NotificationDispatcher, Notifier, WebhookNotifier};
pub use scheduler::EscalationScheduler;
