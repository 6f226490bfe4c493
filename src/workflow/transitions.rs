/// Approval workflow state machine
///
/// Each transition is a pure function: it takes the current request by
/// reference and returns the next request together with the audit entry and
/// the events it produced. The input is never modified, so a failed
/// transition leaves nothing to undo. Persistence, locking and notification
/// live in the runtime layer.

use crate::directory::types::OrgNode;
use crate::error::{Result, WorkflowError};
use crate::workflow::{
    events::{EventKind, WorkflowEvent},
    invariants,
    policy::AuthorizationPolicy,
    types::{
        Actor, ApprovalStep, AuditAction, AuditEntry, BypassRecord, Decision, EscalationTarget,
        Request, RequestStatus, StepRole, StepStatus,
    },
};
use chrono::{DateTime, Utc};
use serde_json::json;

/// Outcome of a successful transition
#[derive(Debug, Clone)]
pub struct Transition {
    pub request: Request,
    pub entry: AuditEntry,
    pub events: Vec<WorkflowEvent>,
}

/// Create a request from a built chain, activating level 1
pub fn start(
    id: String,
    requester: OrgNode,
    category: &str,
    chain: Vec<ApprovalStep>,
    now: DateTime<Utc>,
) -> Result<Transition> {
    if chain.is_empty() {
        return Err(WorkflowError::InvalidTransition(
            "cannot start a request with an empty chain".to_string(),
        ));
    }
    if chain.iter().any(|s| s.status != StepStatus::Waiting) {
        return Err(WorkflowError::InvalidTransition(
            "chain steps must be unassigned when a request starts".to_string(),
        ));
    }
    invariants::check_levels(&chain)?;
    invariants::check_unique_approvers(&chain)?;

    let mut request = Request {
        id,
        requester,
        category: category.trim().to_lowercase(),
        chain,
        audit_log: Vec::new(),
        version: 0,
        created_at: now,
        updated_at: now,
    };
    request.chain[0].activate(now);

    let new_status = request.status();
    let entry = AuditEntry {
        action: AuditAction::Created,
        performed_by: performer(&request.requester),
        timestamp: now,
        reason: None,
        previous_status: None,
        new_status: Some(new_status),
        level: Some(1),
        details: Some(json!({
            "chain": request
                .chain
                .iter()
                .map(|s| json!({ "level": s.level, "role": s.role, "approver": s.approver.email }))
                .collect::<Vec<_>>(),
        })),
    };
    request.record(entry.clone());
    invariants::check_request(&request)?;

    let first = &request.chain[0];
    let events = vec![
        WorkflowEvent::for_request(&request, EventKind::Submitted, &request.requester, now),
        WorkflowEvent::for_request(&request, EventKind::StepAssigned, &first.approver, now).at_level(1),
    ];

    Ok(Transition {
        request,
        entry,
        events,
    })
}

/// Approve or reject the currently pending step
///
/// Only the pending step's approver may decide, except that a role listed in
/// the policy's on-behalf set may act for them; such decisions are flagged on
/// the step and in the audit entry. Nobody decides their own request.
pub fn decide(
    request: &Request,
    actor: &Actor,
    decision: Decision,
    comments: Option<String>,
    policy: &AuthorizationPolicy,
    now: DateTime<Utc>,
) -> Result<Transition> {
    let previous = request.status();
    let index = open_pending_index(request, previous)?;
    let pending = &request.chain[index];

    if request.requester.is(&actor.email) {
        return Err(WorkflowError::InvalidTransition(format!(
            "{} cannot decide their own request",
            actor.email
        )));
    }

    let on_behalf = if pending.approver.is(&actor.email) {
        false
    } else if policy.can_act_on_behalf(actor) {
        true
    } else {
        return Err(WorkflowError::InvalidTransition(format!(
            "{} is not the pending approver for level {} of request {}",
            actor.email, pending.level, request.id
        )));
    };

    let mut next = request.clone();
    let level = pending.level;
    let approver = pending.approver.email.clone();
    let comments = comments.filter(|c| !c.trim().is_empty());

    {
        let step = &mut next.chain[index];
        step.status = match decision {
            Decision::Approve => StepStatus::Approved,
            Decision::Reject => StepStatus::Rejected,
        };
        step.decided_at = Some(now);
        step.decided_by = Some(actor.email.clone());
        step.comments = comments.clone();
        step.on_behalf = on_behalf;
    }

    let activated = match decision {
        Decision::Approve => next_waiting_index(&next, index).map(|i| {
            next.chain[i].activate(now);
            i
        }),
        Decision::Reject => None,
    };

    let new_status = next.status();
    let entry = AuditEntry {
        action: match decision {
            Decision::Approve => AuditAction::Approved,
            Decision::Reject => AuditAction::Rejected,
        },
        performed_by: actor.email.clone(),
        timestamp: now,
        reason: comments.clone(),
        previous_status: Some(previous),
        new_status: Some(new_status),
        level: Some(level),
        details: Some(json!({
            "approver": approver,
            "onBehalf": on_behalf,
            "actorRole": actor.role,
        })),
    };
    next.record(entry.clone());
    next.version += 1;
    invariants::check_request(&next)?;

    let mut events = Vec::new();
    match (decision, activated) {
        (Decision::Approve, Some(i)) => {
            let step = &next.chain[i];
            events.push(
                WorkflowEvent::for_request(&next, EventKind::StepAssigned, &step.approver, now)
                    .at_level(step.level)
                    .by(&actor.email),
            );
        }
        (Decision::Approve, None) => events.push(
            WorkflowEvent::for_request(&next, EventKind::Approved, &next.requester, now)
                .at_level(level)
                .by(&actor.email)
                .because(comments.as_deref()),
        ),
        (Decision::Reject, _) => events.push(
            WorkflowEvent::for_request(&next, EventKind::Rejected, &next.requester, now)
                .at_level(level)
                .by(&actor.email)
                .because(comments.as_deref()),
        ),
    }

    Ok(Transition {
        request: next,
        entry,
        events,
    })
}

/// Redirect the pending step to a higher authority
///
/// The pending step becomes `Escalated` and stays attributable. With
/// `NextLevel` the next waiting step is activated, or a final step for the
/// designated authority is appended when none is left. With
/// `DesignatedAuthority` the authority's waiting step is reused (steps in
/// between are bypassed) or a new step is appended.
pub fn escalate(
    request: &Request,
    actor: &Actor,
    reason: &str,
    target: EscalationTarget,
    authority: &OrgNode,
    policy: &AuthorizationPolicy,
    now: DateTime<Utc>,
) -> Result<Transition> {
    let previous = request.status();
    let index = open_pending_index(request, previous)?;
    let pending = &request.chain[index];

    if request.requester.is(&actor.email) {
        return Err(WorkflowError::InvalidTransition(format!(
            "{} cannot escalate their own request",
            actor.email
        )));
    }
    if !policy.can_escalate(actor, pending) {
        return Err(WorkflowError::InvalidTransition(format!(
            "{} may not escalate level {} of request {}",
            actor.email, pending.level, request.id
        )));
    }

    let mut next = request.clone();
    let from_level = pending.level;
    let from_approver = pending.approver.email.clone();
    let reason = reason.trim().to_string();
    let mut bypassed = Vec::new();

    let destination = match target {
        EscalationTarget::NextLevel => match next_waiting_index(&next, index) {
            Some(i) => i,
            None => append_authority_step(&mut next, pending, authority)?,
        },
        EscalationTarget::DesignatedAuthority => {
            if pending.approver.email == authority.email {
                return Err(WorkflowError::InvalidTransition(format!(
                    "request {} is already pending with the designated authority",
                    request.id
                )));
            }
            let existing = next
                .chain
                .iter()
                .position(|s| s.approver.email == authority.email && s.role != StepRole::Override);
            match existing {
                Some(i) if i > index && next.chain[i].status == StepStatus::Waiting => {
                    let record = BypassRecord {
                        by: actor.email.clone(),
                        reason: format!("escalated to designated authority: {}", reason),
                        at: now,
                    };
                    for step in &mut next.chain[index + 1..i] {
                        if step.status == StepStatus::Waiting {
                            step.status = StepStatus::Bypassed;
                            step.bypass = Some(record.clone());
                            bypassed.push(json!({ "level": step.level, "approver": step.approver.email }));
                        }
                    }
                    i
                }
                Some(_) => {
                    return Err(WorkflowError::InvalidTransition(format!(
                        "designated authority {} has already acted on request {}",
                        authority.email, request.id
                    )))
                }
                None => append_authority_step(&mut next, pending, authority)?,
            }
        }
    };

    {
        let step = &mut next.chain[index];
        step.status = StepStatus::Escalated;
        step.decided_at = Some(now);
        step.decided_by = Some(actor.email.clone());
        step.comments = Some(reason.clone());
    }
    {
        let step = &mut next.chain[destination];
        step.activate(now);
        step.is_escalated = true;
        step.escalated_from = Some(from_level);
    }

    let to_level = next.chain[destination].level;
    let to_approver = next.chain[destination].approver.clone();
    let new_status = next.status();
    let entry = AuditEntry {
        action: AuditAction::Escalated,
        performed_by: actor.email.clone(),
        timestamp: now,
        reason: Some(reason.clone()),
        previous_status: Some(previous),
        new_status: Some(new_status),
        level: Some(from_level),
        details: Some(json!({
            "target": target,
            "actorRole": actor.role,
            "fromLevel": from_level,
            "fromApprover": from_approver,
            "toLevel": to_level,
            "toApprover": to_approver.email,
            "bypassed": bypassed,
        })),
    };
    next.record(entry.clone());
    next.version += 1;
    invariants::check_request(&next)?;

    let events = vec![
        WorkflowEvent::for_request(&next, EventKind::Escalated, &to_approver, now)
            .at_level(to_level)
            .by(&actor.email)
            .because(Some(&reason)),
        WorkflowEvent::for_request(&next, EventKind::Escalated, &next.requester, now)
            .at_level(to_level)
            .by(&actor.email)
            .because(Some(&reason)),
    ];

    Ok(Transition {
        request: next,
        entry,
        events,
    })
}

/// Emergency bypass: close every open step and approve immediately
///
/// `approver` is the directory record of the overriding actor (or a
/// synthesized one); it is attributed the final, approved step.
pub fn override_request(
    request: &Request,
    actor: &Actor,
    approver: OrgNode,
    reason: &str,
    policy: &AuthorizationPolicy,
    now: DateTime<Utc>,
) -> Result<Transition> {
    if !policy.can_override(actor) {
        return Err(WorkflowError::Forbidden(format!(
            "role '{}' may not override approvals",
            actor.role
        )));
    }
    if request.requester.is(&actor.email) {
        return Err(WorkflowError::Forbidden(format!(
            "{} cannot override their own request",
            actor.email
        )));
    }

    let previous = request.status();
    if previous.is_terminal() {
        return Err(WorkflowError::InvalidTransition(format!(
            "request {} is already {}",
            request.id, previous
        )));
    }

    let mut next = request.clone();
    let reason = reason.trim().to_string();
    let record = BypassRecord {
        by: actor.email.clone(),
        reason: reason.clone(),
        at: now,
    };

    let mut bypassed_approvers = Vec::new();
    for step in next.chain.iter_mut().filter(|s| s.status.is_open()) {
        step.status = StepStatus::Bypassed;
        step.bypass = Some(record.clone());
        bypassed_approvers.push(step.approver.clone());
    }

    let mut step = ApprovalStep::new(approver, StepRole::Override);
    step.level = next.chain.len() as u32 + 1;
    step.status = StepStatus::Approved;
    step.assigned_at = Some(now);
    step.decided_at = Some(now);
    step.decided_by = Some(actor.email.clone());
    step.comments = Some(reason.clone());
    let override_level = step.level;
    next.chain.push(step);

    let new_status = next.status();
    let entry = AuditEntry {
        action: AuditAction::Overridden,
        performed_by: actor.email.clone(),
        timestamp: now,
        reason: Some(reason.clone()),
        previous_status: Some(previous),
        new_status: Some(new_status),
        level: Some(override_level),
        details: Some(json!({
            "actorRole": actor.role,
            "bypassed": bypassed_approvers.iter().map(|n| n.email.as_str()).collect::<Vec<_>>(),
        })),
    };
    next.record(entry.clone());
    next.version += 1;
    invariants::check_request(&next)?;

    let mut events = vec![WorkflowEvent::for_request(&next, EventKind::Overridden, &next.requester, now)
        .at_level(override_level)
        .by(&actor.email)
        .because(Some(&reason))];
    events.extend(bypassed_approvers.iter().map(|approver| {
        WorkflowEvent::for_request(&next, EventKind::Overridden, approver, now)
            .by(&actor.email)
            .because(Some(&reason))
    }));

    Ok(Transition {
        request: next,
        entry,
        events,
    })
}

/// Directory record for an actor, or a synthesized one if they are not listed
pub fn actor_node(actor: &Actor, listed: Option<&OrgNode>) -> OrgNode {
    listed.cloned().unwrap_or_else(|| OrgNode {
        name: actor.email.clone(),
        email: actor.email.clone(),
        title: actor.role.to_string(),
        department: None,
        reports_to_email: None,
    })
}

fn open_pending_index(request: &Request, status: RequestStatus) -> Result<usize> {
    if status.is_terminal() {
        return Err(WorkflowError::InvalidTransition(format!(
            "request {} is already {}",
            request.id, status
        )));
    }
    request
        .chain
        .iter()
        .position(|s| s.status == StepStatus::Pending)
        .ok_or_else(|| {
            WorkflowError::InvalidTransition(format!("request {} has no pending step", request.id))
        })
}

fn next_waiting_index(request: &Request, after: usize) -> Option<usize> {
    request
        .chain
        .iter()
        .enumerate()
        .skip(after + 1)
        .find(|(_, s)| s.status == StepStatus::Waiting)
        .map(|(i, _)| i)
}

/// Append a final step bound to the designated authority
fn append_authority_step(next: &mut Request, pending: &ApprovalStep, authority: &OrgNode) -> Result<usize> {
    if pending.approver.email == authority.email
        || next.requester.email == authority.email
        || next
            .chain
            .iter()
            .any(|s| s.approver.email == authority.email && s.role != StepRole::Override)
    {
        return Err(WorkflowError::InvalidTransition(format!(
            "no higher authority is available for request {}",
            next.id
        )));
    }

    let mut step = ApprovalStep::new(authority.clone(), StepRole::Compliance);
    step.level = next.chain.len() as u32 + 1;
    next.chain.push(step);
    Ok(next.chain.len() - 1)
}

fn performer(node: &OrgNode) -> String {
    if node.email.is_empty() {
        node.name.clone()
    } else {
        node.email.clone()
    }
}
