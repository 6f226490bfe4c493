/// Core approval workflow type definitions
///
/// Defines approval steps, requests, audit entries and the actors that drive
/// them. These types are serialized to JSON for persistence; the request
/// status is never stored independently but derived from the chain.

use crate::directory::types::{normalize_email, OrgNode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a single step in an approval chain
///
/// `Waiting` marks a level that has not been reached yet (no `assigned_at`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Waiting,
    Pending,
    Approved,
    Rejected,
    Bypassed,
    Escalated,
}

impl StepStatus {
    /// Pending or not yet reached
    pub fn is_open(self) -> bool {
        matches!(self, Self::Waiting | Self::Pending)
    }
}

/// Why an approver sits at a given level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRole {
    Supervisor,
    DepartmentHead,
    Executive,
    Finance,
    /// Terminal compliance / HR authority
    Compliance,
    /// Step appended by an emergency override
    Override,
}

impl fmt::Display for StepRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Supervisor => write!(f, "supervisor"),
            Self::DepartmentHead => write!(f, "department_head"),
            Self::Executive => write!(f, "executive"),
            Self::Finance => write!(f, "finance"),
            Self::Compliance => write!(f, "compliance"),
            Self::Override => write!(f, "override"),
        }
    }
}

/// Who bypassed a step and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BypassRecord {
    pub by: String,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// One level of an approval chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalStep {
    /// 1-based, contiguous within a chain
    pub level: u32,
    /// Snapshot of the approver at chain-construction time
    pub approver: OrgNode,
    pub role: StepRole,
    pub status: StepStatus,
    pub comments: Option<String>,
    /// Email of whoever actually decided (may differ from `approver` for on-behalf decisions)
    pub decided_by: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub decided_at: Option<DateTime<Utc>>,
    /// Set when a privileged actor decided for the named approver
    #[serde(default)]
    pub on_behalf: bool,
    /// Set when this step was activated by an escalation
    #[serde(default)]
    pub is_escalated: bool,
    /// Level the escalation came from
    pub escalated_from: Option<u32>,
    pub bypass: Option<BypassRecord>,
}

impl ApprovalStep {
    /// A not-yet-reached step; `level` is assigned when the chain is numbered
    pub fn new(approver: OrgNode, role: StepRole) -> Self {
        Self {
            level: 0,
            approver,
            role,
            status: StepStatus::Waiting,
            comments: None,
            decided_by: None,
            assigned_at: None,
            decided_at: None,
            on_behalf: false,
            is_escalated: false,
            escalated_from: None,
            bypass: None,
        }
    }

    /// Mark as the active step
    pub(crate) fn activate(&mut self, at: DateTime<Utc>) {
        self.status = StepStatus::Pending;
        self.assigned_at = Some(at);
    }
}

/// Request status, a pure function of the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RequestStatus {
    /// Waiting on the step at `level`
    Pending { level: u32, role: StepRole },
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    /// Coarse label used for indexed storage columns
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending { .. } => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending { level, role } => write!(f, "pending_level_{} ({})", level, role),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Kind of transition recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Approved,
    Rejected,
    Escalated,
    Overridden,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Escalated => write!(f, "escalated"),
            Self::Overridden => write!(f, "overridden"),
        }
    }
}

/// Immutable record of a single state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub action: AuditAction,
    /// Email of the acting party
    pub performed_by: String,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
    pub previous_status: Option<RequestStatus>,
    pub new_status: Option<RequestStatus>,
    /// Level the transition acted on
    pub level: Option<u32>,
    /// Action-specific context (escalation source/destination, bypassed approvers, ...)
    pub details: Option<serde_json::Value>,
}

/// Role of whoever is driving a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Employee,
    Approver,
    Hr,
    Compliance,
    Admin,
    /// Background jobs (stale-step escalation)
    System,
}

impl FromStr for ActorRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "employee" => Ok(Self::Employee),
            "approver" => Ok(Self::Approver),
            "hr" => Ok(Self::Hr),
            "compliance" => Ok(Self::Compliance),
            "admin" => Ok(Self::Admin),
            "system" => Ok(Self::System),
            other => Err(anyhow::anyhow!("Unknown actor role: {}", other)),
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Employee => "employee",
            Self::Approver => "approver",
            Self::Hr => "hr",
            Self::Compliance => "compliance",
            Self::Admin => "admin",
            Self::System => "system",
        };
        f.write_str(label)
    }
}

/// The party performing a decision, escalation or override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub email: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(email: impl AsRef<str>, role: ActorRole) -> Self {
        Self {
            email: normalize_email(email.as_ref()),
            role,
        }
    }

    pub fn system() -> Self {
        Self {
            email: "system".to_string(),
            role: ActorRole::System,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTarget {
    NextLevel,
    DesignatedAuthority,
}

/// An approval request and its full chain
///
/// Created by `transitions::start`, mutated only by the transition
/// functions, and read-only to everyone else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub(crate) id: String,
    pub(crate) requester: OrgNode,
    pub(crate) category: String,
    pub(crate) chain: Vec<ApprovalStep>,
    pub(crate) audit_log: Vec<AuditEntry>,
    /// Optimistic concurrency version, bumped on every committed transition
    pub(crate) version: u64,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl Request {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn requester(&self) -> &OrgNode {
        &self.requester
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn chain(&self) -> &[ApprovalStep] {
        &self.chain
    }

    pub fn audit_log(&self) -> &[AuditEntry] {
        &self.audit_log
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// The unique step currently awaiting a decision
    pub fn pending_step(&self) -> Option<&ApprovalStep> {
        self.chain
            .iter()
            .find(|step| step.status == StepStatus::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Derive the request status from the chain
    ///
    /// Any rejection is final. Otherwise the pending step determines the
    /// level; with nothing pending the request is approved once its last
    /// step is approved. A chain with open steps but nothing pending points
    /// at its first open step (the invariant checker flags that state).
    pub fn status(&self) -> RequestStatus {
        if self.chain.iter().any(|s| s.status == StepStatus::Rejected) {
            return RequestStatus::Rejected;
        }
        if let Some(step) = self.pending_step() {
            return RequestStatus::Pending {
                level: step.level,
                role: step.role,
            };
        }
        if let Some(step) = self.chain.iter().find(|s| s.status.is_open()) {
            return RequestStatus::Pending {
                level: step.level,
                role: step.role,
            };
        }
        match self.chain.last() {
            Some(last) if last.status == StepStatus::Approved => RequestStatus::Approved,
            _ => RequestStatus::Rejected,
        }
    }

    /// Append-only: the only way an entry reaches the log
    pub(crate) fn record(&mut self, entry: AuditEntry) {
        self.updated_at = entry.timestamp;
        self.audit_log.push(entry);
    }
}

/// Persisted / API shape of a request: the request plus its derived status
#[derive(Debug, Clone, Serialize)]
pub struct RequestDocument {
    #[serde(flatten)]
    pub request: Request,
    pub status: RequestStatus,
}

impl From<Request> for RequestDocument {
    fn from(request: Request) -> Self {
        let status = request.status();
        Self { request, status }
    }
}
