/// Structural invariants of approval chains
///
/// Checked after construction and after every transition, before anything
/// is persisted. A violation is an internal fault, never a user error.

use crate::directory::types::OrgNode;
use crate::error::{Result, WorkflowError};
use crate::workflow::types::{ApprovalStep, Request, StepRole, StepStatus};
use std::collections::HashSet;

/// Levels are exactly 1..=N in order
pub fn check_levels(chain: &[ApprovalStep]) -> Result<()> {
    for (index, step) in chain.iter().enumerate() {
        let expected = index as u32 + 1;
        if step.level != expected {
            return Err(WorkflowError::InvariantViolation(format!(
                "level {} found at position {}, expected {}",
                step.level, index, expected
            )));
        }
    }
    Ok(())
}

/// No approver email appears twice (override steps are attributed to the
/// overriding actor and are exempt)
pub fn check_unique_approvers(chain: &[ApprovalStep]) -> Result<()> {
    let mut seen = HashSet::new();
    for step in chain.iter().filter(|s| s.role != StepRole::Override) {
        if !seen.insert(step.approver.email.as_str()) {
            return Err(WorkflowError::InvariantViolation(format!(
                "approver {} appears more than once",
                step.approver.email
            )));
        }
    }
    Ok(())
}

/// Validate a freshly built chain
///
/// The terminal authority must be the last step, unless the requester is
/// that authority, in which case it must not appear at all.
pub fn check_chain(chain: &[ApprovalStep], terminal: &OrgNode, requester: &OrgNode) -> Result<()> {
    if chain.is_empty() {
        return Err(WorkflowError::InvariantViolation("chain is empty".to_string()));
    }
    check_levels(chain)?;
    check_unique_approvers(chain)?;

    if chain.iter().any(|s| s.status != StepStatus::Waiting) {
        return Err(WorkflowError::InvariantViolation(
            "a new chain must only contain waiting steps".to_string(),
        ));
    }

    if !requester.email.is_empty() && chain.iter().any(|s| s.approver.email == requester.email) {
        return Err(WorkflowError::InvariantViolation(format!(
            "requester {} would approve their own request",
            requester.email
        )));
    }

    let requester_is_terminal = requester.email == terminal.email;
    let terminal_position = chain.iter().position(|s| s.approver.email == terminal.email);
    match (requester_is_terminal, terminal_position) {
        (true, None) => Ok(()),
        (false, Some(position))
            if position == chain.len() - 1 && chain[position].role == StepRole::Compliance =>
        {
            Ok(())
        }
        _ => Err(WorkflowError::InvariantViolation(format!(
            "terminal authority {} is not the final step",
            terminal.email
        ))),
    }
}

/// Validate a request after a transition
pub fn check_request(request: &Request) -> Result<()> {
    check_levels(&request.chain)?;
    check_unique_approvers(&request.chain)?;

    let pending = request
        .chain
        .iter()
        .filter(|s| s.status == StepStatus::Pending)
        .count();
    let terminal = request.status().is_terminal();

    match (terminal, pending) {
        (true, 0) | (false, 1) => Ok(()),
        (true, n) => Err(WorkflowError::InvariantViolation(format!(
            "terminal request {} still has {} pending steps",
            request.id, n
        ))),
        (false, n) => Err(WorkflowError::InvariantViolation(format!(
            "open request {} has {} pending steps, expected exactly one",
            request.id, n
        ))),
    }
}
