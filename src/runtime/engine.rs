/// Workflow engine
///
/// Owns the request lifecycle: builds chains from the current directory
/// snapshot, serializes transitions per request id, persists them with an
/// optimistic version check and hands the resulting events to the
/// notification dispatcher once the commit has succeeded.

use crate::directory::{registry::DirectoryRegistry, snapshot::OrgDirectory, types::Identity};
use crate::error::{Result, WorkflowError};
use crate::runtime::{locks::RequestLocks, notifier::NotificationDispatcher};
use crate::storage::WorkflowStore;
use crate::workflow::{
    chain::ChainBuilder,
    policy::AuthorizationPolicy,
    transitions::{self, Transition},
    types::{Actor, ApprovalStep, AuditEntry, Decision, EscalationTarget, Request},
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

pub struct WorkflowEngine {
    directory: Arc<DirectoryRegistry>,
    builder: ChainBuilder,
    store: Arc<dyn WorkflowStore>,
    notifications: NotificationDispatcher,
    policy: AuthorizationPolicy,
    locks: RequestLocks,
}

impl WorkflowEngine {
    pub fn new(
        directory: Arc<DirectoryRegistry>,
        store: Arc<dyn WorkflowStore>,
        notifications: NotificationDispatcher,
        policy: AuthorizationPolicy,
    ) -> Self {
        Self {
            directory,
            builder: ChainBuilder::default(),
            store,
            notifications,
            policy,
            locks: RequestLocks::new(),
        }
    }

    pub fn directory(&self) -> &Arc<DirectoryRegistry> {
        &self.directory
    }

    pub fn notifications(&self) -> &NotificationDispatcher {
        &self.notifications
    }

    /// Resolve the approver chain for a requester over the current snapshot
    pub fn build_chain(&self, requester: &Identity, category: &str) -> Result<Vec<ApprovalStep>> {
        self.builder
            .build(&self.directory.snapshot(), requester, category)
    }

    /// Create a request from an already-built chain
    pub async fn start(
        &self,
        requester: &Identity,
        category: &str,
        chain: Vec<ApprovalStep>,
    ) -> Result<Request> {
        let snapshot = self.directory.snapshot();
        let (requester_node, _) = self.builder.resolve_requester(&snapshot, requester);
        let id = uuid::Uuid::new_v4().to_string();

        let Transition {
            request,
            entry,
            events,
        } = transitions::start(id, requester_node, category, chain, Utc::now())?;

        self.store.insert(&request, &entry).await?;

        tracing::info!(
            "📝 Request {} created for {} ({}, {} levels)",
            request.id(),
            requester.key,
            request.category(),
            request.chain().len()
        );
        self.notifications.dispatch(events);

        Ok(request)
    }

    /// Build the chain and start the request in one call
    pub async fn submit(&self, requester: &Identity, category: &str) -> Result<Request> {
        let chain = self.build_chain(requester, category)?;
        self.start(requester, category, chain).await
    }

    pub async fn get(&self, request_id: &str) -> Result<Request> {
        self.store
            .load(request_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("request {}", request_id)))
    }

    pub async fn decide(
        &self,
        request_id: &str,
        actor: &Actor,
        decision: Decision,
        comments: Option<String>,
    ) -> Result<Request> {
        self.apply(request_id, "decide", |request, _| {
            transitions::decide(request, actor, decision, comments, &self.policy, Utc::now())
        })
        .await
    }

    pub async fn escalate(
        &self,
        request_id: &str,
        actor: &Actor,
        reason: &str,
        target: EscalationTarget,
    ) -> Result<Request> {
        self.apply(request_id, "escalate", |request, directory| {
            transitions::escalate(
                request,
                actor,
                reason,
                target,
                directory.terminal_authority(),
                &self.policy,
                Utc::now(),
            )
        })
        .await
    }

    /// Emergency bypass of every open step
    pub async fn override_request(&self, request_id: &str, actor: &Actor, reason: &str) -> Result<Request> {
        self.apply(request_id, "override", |request, directory| {
            let approver = transitions::actor_node(actor, directory.lookup(&actor.email));
            transitions::override_request(request, actor, approver, reason, &self.policy, Utc::now())
        })
        .await
    }

    /// Audit entries of a request in chronological order
    pub async fn history(&self, request_id: &str) -> Result<Vec<AuditEntry>> {
        self.store.history(request_id).await
    }

    /// Escalate every request whose pending step was assigned before `now - older_than`
    ///
    /// The listing only selects candidates; staleness is judged again on the
    /// request loaded under its lock, so a step assigned after the listing is
    /// left alone. Returns the ids that were escalated. Requests that cannot
    /// be escalated further (already with the designated authority) are skipped.
    pub async fn escalate_stale(&self, older_than: Duration, now: DateTime<Utc>) -> Result<Vec<String>> {
        let cutoff = now - older_than;
        let reason = format!("no response within {} hours", older_than.num_hours());
        let system = Actor::system();
        let mut escalated = Vec::new();

        for request in self.store.list_open().await? {
            if !is_stale(&request, cutoff) {
                continue;
            }

            let result = self
                .apply(request.id(), "auto-escalate", |current, directory| {
                    if !is_stale(current, cutoff) {
                        return Err(WorkflowError::InvalidTransition(format!(
                            "pending step of request {} is no longer stale",
                            current.id()
                        )));
                    }
                    transitions::escalate(
                        current,
                        &system,
                        &reason,
                        EscalationTarget::NextLevel,
                        directory.terminal_authority(),
                        &self.policy,
                        Utc::now(),
                    )
                })
                .await;

            match result {
                Ok(_) => escalated.push(request.id().to_string()),
                Err(e) if e.is_user_facing() || matches!(e, WorkflowError::ConcurrentModification { .. }) => {
                    tracing::debug!("⏭️ Skipping stale request {}: {}", request.id(), e);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(escalated)
    }

    /// Lock, load, transition, commit, notify
    async fn apply<F>(&self, request_id: &str, operation: &str, transition: F) -> Result<Request>
    where
        F: FnOnce(&Request, &OrgDirectory) -> Result<Transition>,
    {
        let result = {
            let _guard = self.locks.acquire(request_id).await;
            self.apply_locked(request_id, transition).await
        };
        self.locks.release(request_id).await;

        match result {
            Ok(Transition { request, events, .. }) => {
                tracing::info!(
                    "✅ {} on request {} committed, status now {}",
                    operation,
                    request.id(),
                    request.status()
                );
                self.notifications.dispatch(events);
                Ok(request)
            }
            Err(e) if e.is_user_facing() => {
                tracing::warn!("🚫 {} on request {} rejected: {}", operation, request_id, e);
                Err(e)
            }
            Err(e) => {
                tracing::error!("❌ {} on request {} failed: {}", operation, request_id, e);
                Err(e)
            }
        }
    }

    async fn apply_locked<F>(&self, request_id: &str, transition: F) -> Result<Transition>
    where
        F: FnOnce(&Request, &OrgDirectory) -> Result<Transition>,
    {
        let current = self.get(request_id).await?;
        let snapshot = self.directory.snapshot();
        let next = transition(&current, &snapshot)?;
        self.store
            .commit(&next.request, current.version(), &next.entry)
            .await?;
        Ok(next)
    }
}

/// Pending step assigned strictly before `cutoff`
fn is_stale(request: &Request, cutoff: DateTime<Utc>) -> bool {
    request
        .pending_step()
        .and_then(|step| step.assigned_at)
        .is_some_and(|assigned| assigned < cutoff)
}
