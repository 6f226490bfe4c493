//! End-to-end workflow scenarios against the sample organization in
//! `fixtures/org.json`, driven through `WorkflowEngine` with the in-memory store.

use approvalway::{
    directory::{DirectoryRegistry, Identity},
    runtime::{NotificationDispatcher, Notifier, WorkflowEngine},
    storage::{AuditTrail, InMemoryStore, RequestStore},
    workflow::{
        events::{EventKind, WorkflowEvent},
        transitions, Actor, ActorRole, AuditAction, AuditEntry, AuthorizationPolicy, ChainBuilder,
        Decision, EscalationTarget, RequestStatus, StepRole, StepStatus,
    },
    Request, WorkflowError,
};
use async_trait::async_trait;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/org.json")
}

fn engine_with(notifications: NotificationDispatcher) -> WorkflowEngine {
    let directory = Arc::new(DirectoryRegistry::from_file(fixture_path()).unwrap());
    WorkflowEngine::new(
        directory,
        Arc::new(InMemoryStore::new()),
        notifications,
        AuthorizationPolicy::default(),
    )
}

fn engine() -> WorkflowEngine {
    engine_with(NotificationDispatcher::new(Duration::from_millis(200)))
}

fn emails(request: &Request) -> Vec<&str> {
    request.chain().iter().map(|s| s.approver.email.as_str()).collect()
}

fn statuses(request: &Request) -> Vec<StepStatus> {
    request.chain().iter().map(|s| s.status).collect()
}

fn approver(email: &str) -> Actor {
    Actor::new(email, ActorRole::Approver)
}

fn hr() -> Actor {
    Actor::new("rita@corp.example", ActorRole::Hr)
}

#[derive(Default)]
struct Recording(Mutex<Vec<(EventKind, String)>>);

#[async_trait]
impl Notifier for Recording {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, event: &WorkflowEvent) -> anyhow::Result<()> {
        self.0
            .lock()
            .await
            .push((event.kind, event.recipient.email.clone()));
        Ok(())
    }
}

impl Recording {
    /// Wait until at least `count` deliveries have been recorded
    async fn wait_for(&self, count: usize) -> Vec<(EventKind, String)> {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let seen = self.0.lock().await.clone();
                if seen.len() >= count {
                    return seen;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("notifications were not delivered")
    }
}

#[tokio::test]
async fn employee_leave_chain_walks_the_hierarchy() {
    let engine = engine();
    let chain = engine
        .build_chain(&Identity::new("ann@corp.example"), "leave")
        .unwrap();

    let approvers: Vec<_> = chain.iter().map(|s| s.approver.email.as_str()).collect();
    assert_eq!(
        approvers,
        vec![
            "sam@corp.example",
            "hana@corp.example",
            "eve@corp.example",
            "carl@corp.example"
        ]
    );
    assert_eq!(chain.last().unwrap().role, StepRole::Compliance);
}

#[tokio::test]
async fn department_head_chain_skips_self() {
    let engine = engine();
    let chain = engine.build_chain(&Identity::new("Hana"), "leave").unwrap();

    let approvers: Vec<_> = chain.iter().map(|s| s.approver.email.as_str()).collect();
    assert_eq!(approvers, vec!["eve@corp.example", "carl@corp.example"]);
    assert_eq!(chain.iter().map(|s| s.level).collect::<Vec<_>>(), vec![1, 2]);
}

#[tokio::test]
async fn terminal_authority_is_omitted_for_itself() {
    let engine = engine();
    let chain = engine
        .build_chain(&Identity::new("carl@corp.example"), "leave")
        .unwrap();

    assert!(chain.iter().all(|s| s.approver.email != "carl@corp.example"));
    assert_eq!(chain[0].approver.email, "eve@corp.example");
}

#[tokio::test]
async fn unlisted_requester_uses_fallback_recipe() {
    let engine = engine();
    let chain = engine
        .build_chain(
            &Identity::new("ghost@corp.example").with_department("Sales"),
            "leave",
        )
        .unwrap();

    let approvers: Vec<_> = chain.iter().map(|s| s.approver.email.as_str()).collect();
    assert_eq!(
        approvers,
        vec!["dora@corp.example", "eve@corp.example", "carl@corp.example"]
    );
}

#[tokio::test]
async fn approve_then_reject_leaves_later_steps_untouched() {
    let engine = engine();
    let request = engine
        .submit(&Identity::new("ann@corp.example"), "leave")
        .await
        .unwrap();
    let id = request.id().to_string();
    assert_eq!(
        request.status(),
        RequestStatus::Pending {
            level: 1,
            role: StepRole::Supervisor
        }
    );

    let request = engine
        .decide(&id, &approver("sam@corp.example"), Decision::Approve, None)
        .await
        .unwrap();
    assert_eq!(
        statuses(&request),
        vec![
            StepStatus::Approved,
            StepStatus::Pending,
            StepStatus::Waiting,
            StepStatus::Waiting
        ]
    );

    let request = engine
        .decide(
            &id,
            &approver("hana@corp.example"),
            Decision::Reject,
            Some("peak season".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(request.status(), RequestStatus::Rejected);
    assert_eq!(
        statuses(&request),
        vec![
            StepStatus::Approved,
            StepStatus::Rejected,
            StepStatus::Waiting,
            StepStatus::Waiting
        ]
    );
    assert!(request.chain()[2].assigned_at.is_none());
    assert_eq!(request.chain()[1].comments.as_deref(), Some("peak season"));

    let history = engine.history(&id).await.unwrap();
    let actions: Vec<_> = history.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![AuditAction::Created, AuditAction::Approved, AuditAction::Rejected]
    );
    assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn deciding_twice_is_rejected_without_changes() {
    let engine = engine();
    let request = engine
        .submit(&Identity::new("ann@corp.example"), "task")
        .await
        .unwrap();
    let id = request.id().to_string();

    let approved = engine
        .decide(&id, &approver("sam@corp.example"), Decision::Approve, None)
        .await
        .unwrap();

    let err = engine
        .decide(&id, &approver("sam@corp.example"), Decision::Approve, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition(_)));

    let current = engine.get(&id).await.unwrap();
    assert_eq!(current, approved);
    assert_eq!(engine.history(&id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn stuck_step_escalates_to_next_level() {
    let engine = engine();
    let request = engine
        .submit(&Identity::new("ann@corp.example"), "leave")
        .await
        .unwrap();
    let id = request.id().to_string();
    engine
        .decide(&id, &approver("sam@corp.example"), Decision::Approve, None)
        .await
        .unwrap();

    let request = engine
        .escalate(&id, &hr(), "no response", EscalationTarget::NextLevel)
        .await
        .unwrap();

    assert_eq!(
        statuses(&request),
        vec![
            StepStatus::Approved,
            StepStatus::Escalated,
            StepStatus::Pending,
            StepStatus::Waiting
        ]
    );
    assert!(request.chain()[2].is_escalated);
    assert_eq!(request.chain()[2].escalated_from, Some(2));

    let history = engine.history(&id).await.unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.action, AuditAction::Escalated);
    assert_eq!(last.reason.as_deref(), Some("no response"));
    let details = last.details.as_ref().unwrap();
    assert_eq!(details["fromApprover"], json!("hana@corp.example"));
    assert_eq!(details["toApprover"], json!("eve@corp.example"));
}

#[tokio::test]
async fn override_bypasses_every_open_step() {
    let recording = Arc::new(Recording::default());
    let engine = engine_with(
        NotificationDispatcher::new(Duration::from_millis(200)).with_notifier(recording.clone()),
    );
    let request = engine
        .submit(&Identity::new("ann@corp.example"), "incident")
        .await
        .unwrap();
    let id = request.id().to_string();
    assert_eq!(request.chain().len(), 3);

    let request = engine
        .override_request(&id, &hr(), "medical emergency")
        .await
        .unwrap();

    assert_eq!(request.status(), RequestStatus::Approved);
    assert_eq!(
        statuses(&request),
        vec![
            StepStatus::Bypassed,
            StepStatus::Bypassed,
            StepStatus::Bypassed,
            StepStatus::Approved
        ]
    );
    let last = request.chain().last().unwrap();
    assert_eq!(last.role, StepRole::Override);
    assert_eq!(last.approver.email, "rita@corp.example");
    assert_eq!(last.level, 4);
    assert!(request.chain()[..3]
        .iter()
        .all(|s| s.bypass.as_ref().is_some_and(|b| b.reason == "medical emergency")));

    let history = engine.history(&id).await.unwrap();
    let entry = history.last().unwrap();
    assert_eq!(entry.action, AuditAction::Overridden);
    assert_eq!(
        entry.details.as_ref().unwrap()["bypassed"],
        json!(["sam@corp.example", "hana@corp.example", "carl@corp.example"])
    );

    // submitted + step_assigned, then requester + three bypassed approvers
    let delivered = recording.wait_for(6).await;
    let overridden: Vec<_> = delivered
        .iter()
        .filter(|(kind, _)| *kind == EventKind::Overridden)
        .map(|(_, email)| email.as_str())
        .collect();
    assert_eq!(overridden.len(), 4);
    assert!(overridden.contains(&"ann@corp.example"));
    assert!(overridden.contains(&"carl@corp.example"));
}

#[tokio::test]
async fn override_requires_privileged_role() {
    let engine = engine();
    let request = engine
        .submit(&Identity::new("ann@corp.example"), "leave")
        .await
        .unwrap();
    let id = request.id().to_string();

    let err = engine
        .override_request(&id, &approver("sam@corp.example"), "just because")
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden(_)));
    assert_eq!(engine.get(&id).await.unwrap(), request);
}

#[tokio::test]
async fn racing_decisions_on_one_request_transition_once() {
    let engine = Arc::new(engine());
    let request = engine
        .submit(&Identity::new("ann@corp.example"), "leave")
        .await
        .unwrap();
    let id = request.id().to_string();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = Arc::clone(&engine);
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            engine
                .decide(&id, &approver("sam@corp.example"), Decision::Approve, None)
                .await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(WorkflowError::InvalidTransition(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(succeeded, 1);

    let request = engine.get(&id).await.unwrap();
    assert_eq!(
        request
            .chain()
            .iter()
            .filter(|s| s.status == StepStatus::Pending)
            .count(),
        1
    );
    assert_eq!(request.chain()[1].status, StepStatus::Pending);
    assert_eq!(engine.history(&id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn stale_steps_are_escalated_by_system() {
    let engine = engine();
    let request = engine
        .submit(&Identity::new("ann@corp.example"), "leave")
        .await
        .unwrap();
    let id = request.id().to_string();
    let fresh = engine
        .submit(&Identity::new("ben@corp.example"), "task")
        .await
        .unwrap();

    let none = engine
        .escalate_stale(chrono::Duration::hours(72), chrono::Utc::now())
        .await
        .unwrap();
    assert!(none.is_empty());

    let later = chrono::Utc::now() + chrono::Duration::hours(73);
    let escalated = engine
        .escalate_stale(chrono::Duration::hours(72), later)
        .await
        .unwrap();
    assert!(escalated.contains(&id));
    assert!(escalated.contains(&fresh.id().to_string()));

    let request = engine.get(&id).await.unwrap();
    assert_eq!(request.chain()[0].status, StepStatus::Escalated);
    assert_eq!(request.chain()[1].status, StepStatus::Pending);

    let entry = engine.history(&id).await.unwrap().pop().unwrap();
    assert_eq!(entry.performed_by, "system");
    assert_eq!(entry.reason.as_deref(), Some("no response within 72 hours"));
}

#[tokio::test]
async fn unknown_request_is_not_found() {
    let engine = engine();
    let err = engine
        .decide("missing", &approver("sam@corp.example"), Decision::Approve, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound(_)));
    assert!(matches!(
        engine.history("missing").await,
        Err(WorkflowError::NotFound(_))
    ));
}

#[tokio::test]
async fn directory_reload_affects_new_chains_only() {
    let dir = std::env::temp_dir().join(format!("approvalway-reload-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let org_file = dir.join("org.json");
    std::fs::copy(fixture_path(), &org_file).unwrap();

    let registry = Arc::new(DirectoryRegistry::from_file(&org_file).unwrap());
    let engine = WorkflowEngine::new(
        Arc::clone(&registry),
        Arc::new(InMemoryStore::new()),
        NotificationDispatcher::new(Duration::from_millis(200)),
        AuthorizationPolicy::default(),
    );

    let before = engine
        .submit(&Identity::new("ann@corp.example"), "leave")
        .await
        .unwrap();

    let document = std::fs::read_to_string(&org_file)
        .unwrap()
        .replace("eve@corp.example", "ezra@corp.example")
        .replace("\"Eve\"", "\"Ezra\"");
    std::fs::write(&org_file, document).unwrap();
    registry.reload().unwrap();

    let after = engine
        .submit(&Identity::new("ann@corp.example"), "leave")
        .await
        .unwrap();

    assert_eq!(emails(&before)[2], "eve@corp.example");
    assert_eq!(emails(&after)[2], "ezra@corp.example");
    assert_eq!(
        emails(&engine.get(before.id()).await.unwrap())[2],
        "eve@corp.example"
    );

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn privileged_requester_cannot_override_own_leave() {
    let engine = engine();
    let request = engine
        .submit(&Identity::new("rita@corp.example"), "leave")
        .await
        .unwrap();
    let id = request.id().to_string();

    let err = engine
        .override_request(&id, &hr(), "approving myself")
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden(_)));

    let err = engine
        .escalate(&id, &hr(), "skip ahead", EscalationTarget::DesignatedAuthority)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition(_)));

    assert_eq!(engine.get(&id).await.unwrap(), request);
    assert_eq!(engine.history(&id).await.unwrap().len(), 1);
}

/// Store whose open listing is a snapshot taken earlier, so the sweep sees
/// requests as they were before later decisions landed
#[derive(Default)]
struct FrozenListing {
    inner: InMemoryStore,
    listed: Mutex<Vec<Request>>,
}

impl FrozenListing {
    async fn freeze(&self) {
        *self.listed.lock().await = self.inner.list_open().await.unwrap();
    }
}

#[async_trait]
impl RequestStore for FrozenListing {
    async fn insert(&self, request: &Request, created: &AuditEntry) -> approvalway::Result<()> {
        self.inner.insert(request, created).await
    }

    async fn load(&self, id: &str) -> approvalway::Result<Option<Request>> {
        self.inner.load(id).await
    }

    async fn commit(
        &self,
        request: &Request,
        expected_version: u64,
        entry: &AuditEntry,
    ) -> approvalway::Result<()> {
        self.inner.commit(request, expected_version, entry).await
    }

    async fn list_open(&self) -> approvalway::Result<Vec<Request>> {
        Ok(self.listed.lock().await.clone())
    }
}

#[async_trait]
impl AuditTrail for FrozenListing {
    async fn append(&self, request_id: &str, entry: &AuditEntry) -> approvalway::Result<()> {
        self.inner.append(request_id, entry).await
    }

    async fn history(&self, request_id: &str) -> approvalway::Result<Vec<AuditEntry>> {
        self.inner.history(request_id).await
    }
}

#[tokio::test]
async fn sweep_leaves_step_assigned_after_listing() {
    let directory = Arc::new(DirectoryRegistry::from_file(fixture_path()).unwrap());
    let store = Arc::new(FrozenListing::default());
    let engine = WorkflowEngine::new(
        Arc::clone(&directory),
        store.clone(),
        NotificationDispatcher::new(Duration::from_millis(200)),
        AuthorizationPolicy::default(),
    );

    // Submitted four days ago, first step never touched
    let snapshot = directory.snapshot();
    let builder = ChainBuilder::default();
    let identity = Identity::new("ann@corp.example");
    let chain = builder.build(&snapshot, &identity, "leave").unwrap();
    let (requester, _) = builder.resolve_requester(&snapshot, &identity);
    let submitted = chrono::Utc::now() - chrono::Duration::hours(100);
    let start = transitions::start("old-1".to_string(), requester, "leave", chain, submitted).unwrap();
    store.insert(&start.request, &start.entry).await.unwrap();

    store.freeze().await;
    engine
        .decide("old-1", &approver("sam@corp.example"), Decision::Approve, None)
        .await
        .unwrap();

    let escalated = engine
        .escalate_stale(chrono::Duration::hours(72), chrono::Utc::now())
        .await
        .unwrap();
    assert!(escalated.is_empty());

    let request = engine.get("old-1").await.unwrap();
    assert_eq!(
        statuses(&request),
        vec![
            StepStatus::Approved,
            StepStatus::Pending,
            StepStatus::Waiting,
            StepStatus::Waiting
        ]
    );
    assert_eq!(engine.history("old-1").await.unwrap().len(), 2);
}
