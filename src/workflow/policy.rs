/// Authorization policy for privileged workflow actions
///
/// Which roles may override a request and which may decide on behalf of the
/// named pending approver are configured separately; both default to the HR,
/// compliance and admin roles.

use crate::workflow::types::{Actor, ActorRole, ApprovalStep};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationPolicy {
    /// Roles allowed to perform an emergency override
    pub override_roles: HashSet<ActorRole>,
    /// Roles allowed to approve/reject for the pending step's named approver
    pub on_behalf_roles: HashSet<ActorRole>,
}

impl Default for AuthorizationPolicy {
    fn default() -> Self {
        let privileged: HashSet<ActorRole> =
            [ActorRole::Hr, ActorRole::Compliance, ActorRole::Admin].into();
        Self {
            override_roles: privileged.clone(),
            on_behalf_roles: privileged,
        }
    }
}

impl AuthorizationPolicy {
    pub fn can_override(&self, actor: &Actor) -> bool {
        self.override_roles.contains(&actor.role)
    }

    pub fn can_act_on_behalf(&self, actor: &Actor) -> bool {
        self.on_behalf_roles.contains(&actor.role)
    }

    /// The pending approver, any privileged role, or the system actor
    pub fn can_escalate(&self, actor: &Actor, pending: &ApprovalStep) -> bool {
        actor.role == ActorRole::System
            || pending.approver.is(&actor.email)
            || self.can_override(actor)
            || self.can_act_on_behalf(actor)
    }
}
