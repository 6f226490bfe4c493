/// Workflow events emitted after a committed transition
///
/// Events are addressed to one recipient each; the notification layer
/// delivers them best-effort and never reports back into the workflow.

use crate::directory::types::OrgNode;
use crate::workflow::types::{Request, RequestStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Request created (to the requester)
    Submitted,
    /// A step became pending (to its approver)
    StepAssigned,
    Approved,
    Rejected,
    Escalated,
    Overridden,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEvent {
    pub kind: EventKind,
    pub request_id: String,
    pub category: String,
    pub recipient: OrgNode,
    pub status: RequestStatus,
    /// Level the event concerns, if any
    pub level: Option<u32>,
    pub actor: Option<String>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl WorkflowEvent {
    pub(crate) fn for_request(
        request: &Request,
        kind: EventKind,
        recipient: &OrgNode,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            request_id: request.id.clone(),
            category: request.category.clone(),
            recipient: recipient.clone(),
            status: request.status(),
            level: None,
            actor: None,
            reason: None,
            occurred_at,
        }
    }

    pub(crate) fn at_level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }

    pub(crate) fn by(mut self, actor: &str) -> Self {
        self.actor = Some(actor.to_string());
        self
    }

    pub(crate) fn because(mut self, reason: Option<&str>) -> Self {
        self.reason = reason.map(str::to_string);
        self
    }
}
