/// Approval chain construction
///
/// Turns the organization directory into an ordered, deduplicated list of
/// approvers for one requester and request category. Construction is a pure
/// fold over the category's recipe: the set of already-seen emails is
/// threaded through explicitly and the finished chain is validated before it
/// is returned, so a partially built chain is never observable.

use crate::directory::{
    snapshot::OrgDirectory,
    types::{normalize_email, Identity, OrgNode},
};
use crate::error::{Result, WorkflowError};
use crate::workflow::{
    invariants,
    types::{ApprovalStep, StepRole},
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A function from (requester, directory) to an optional approver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleSelector {
    /// The requester's reporting line
    Supervisor,
    /// Head of the requester's department
    DepartmentHead,
    Executive,
    Finance,
    /// The terminal authority; always placed last regardless of recipe position
    Compliance,
}

impl RoleSelector {
    /// Resolve this selector for `requester`
    pub fn resolve<'d>(&self, requester: &OrgNode, directory: &'d OrgDirectory) -> Option<&'d OrgNode> {
        match self {
            Self::Supervisor => directory.supervisor_of(requester),
            Self::DepartmentHead => requester
                .department
                .as_deref()
                .and_then(|department| directory.department_head(department)),
            Self::Executive => directory.executive(),
            Self::Finance => directory.finance(),
            Self::Compliance => Some(directory.terminal_authority()),
        }
    }

    pub fn step_role(&self) -> StepRole {
        match self {
            Self::Supervisor => StepRole::Supervisor,
            Self::DepartmentHead => StepRole::DepartmentHead,
            Self::Executive => StepRole::Executive,
            Self::Finance => StepRole::Finance,
            Self::Compliance => StepRole::Compliance,
        }
    }
}

/// Ordered selectors for one request category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainRecipe {
    pub category: String,
    pub selectors: Vec<RoleSelector>,
}

impl ChainRecipe {
    pub fn new(category: impl Into<String>, selectors: Vec<RoleSelector>) -> Self {
        Self {
            category: category.into(),
            selectors,
        }
    }
}

/// Category -> recipe lookup with a default for unknown categories
#[derive(Debug, Clone)]
pub struct RecipeBook {
    recipes: HashMap<String, ChainRecipe>,
    default: ChainRecipe,
    fallback: ChainRecipe,
}

impl Default for RecipeBook {
    fn default() -> Self {
        use RoleSelector::*;

        let recipes = [
            ChainRecipe::new("leave", vec![Supervisor, DepartmentHead, Executive, Compliance]),
            ChainRecipe::new("incident", vec![Supervisor, DepartmentHead, Compliance]),
            ChainRecipe::new("task", vec![Supervisor, DepartmentHead]),
            ChainRecipe::new("invoice", vec![DepartmentHead, Finance, Executive, Compliance]),
        ]
        .into_iter()
        .map(|recipe| (recipe.category.clone(), recipe))
        .collect();

        Self {
            recipes,
            default: ChainRecipe::new("default", vec![Supervisor, DepartmentHead]),
            fallback: ChainRecipe::new("fallback", vec![DepartmentHead, Executive, Compliance]),
        }
    }
}

impl RecipeBook {
    /// Register or replace the recipe for a category
    pub fn with_recipe(mut self, recipe: ChainRecipe) -> Self {
        let key = recipe.category.trim().to_lowercase();
        self.recipes.insert(key, recipe);
        self
    }

    /// Recipe for `category`, or the default recipe for unknown categories
    pub fn recipe(&self, category: &str) -> &ChainRecipe {
        self.recipes
            .get(&category.trim().to_lowercase())
            .unwrap_or(&self.default)
    }

    /// Recipe used when the requester is not in the directory
    pub fn fallback(&self) -> &ChainRecipe {
        &self.fallback
    }
}

/// Builds approval chains over a directory snapshot
///
/// Holds no mutable state; `build` may be called concurrently.
#[derive(Debug, Clone, Default)]
pub struct ChainBuilder {
    recipes: RecipeBook,
}

impl ChainBuilder {
    pub fn new(recipes: RecipeBook) -> Self {
        Self { recipes }
    }

    /// Resolve the requester for `identity`, falling back to an unlisted record
    pub fn resolve_requester(&self, directory: &OrgDirectory, identity: &Identity) -> (OrgNode, bool) {
        match directory.lookup(&identity.key) {
            Some(node) => (node.clone(), true),
            None => (OrgNode::unlisted(identity), false),
        }
    }

    /// Build the ordered, deduplicated approver chain for `identity` and `category`
    ///
    /// Recipes declared in the organization document take precedence over the
    /// builder's recipe book. Fails with `ChainResolutionFailure` only when no
    /// approver at all can be resolved.
    pub fn build(
        &self,
        directory: &OrgDirectory,
        identity: &Identity,
        category: &str,
    ) -> Result<Vec<ApprovalStep>> {
        let (requester, listed) = self.resolve_requester(directory, identity);

        let selectors: &[RoleSelector] = if !listed {
            tracing::debug!(
                "Requester '{}' not in directory, using fallback recipe",
                identity.key
            );
            &self.recipes.fallback().selectors
        } else if let Some(custom) = directory.recipes().get(&category.trim().to_lowercase()) {
            custom
        } else {
            &self.recipes.recipe(category).selectors
        };

        let chain = fold_chain(&requester, directory, selectors);

        if chain.is_empty() {
            tracing::warn!(
                "❌ No approvers resolved for '{}' (category '{}')",
                identity.key,
                category
            );
            return Err(WorkflowError::ChainResolutionFailure {
                requester: identity.key.clone(),
                category: category.to_string(),
            });
        }

        invariants::check_chain(&chain, directory.terminal_authority(), &requester)?;

        tracing::debug!(
            "🔗 Built chain for '{}' ({}): [{}]",
            identity.key,
            category,
            chain
                .iter()
                .map(|s| format!("{}:{}", s.role, s.approver.email))
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(chain)
    }
}

/// Fold the selectors into a numbered chain
///
/// A candidate is skipped when it does not resolve, was already added
/// (first occurrence wins), is the requester, or is the terminal authority
/// (which is reserved for the final slot). The terminal authority is then
/// appended unless the requester is that authority.
fn fold_chain(requester: &OrgNode, directory: &OrgDirectory, selectors: &[RoleSelector]) -> Vec<ApprovalStep> {
    let terminal = directory.terminal_authority();
    let requester_email = normalize_email(&requester.email);

    let (mut steps, _seen) = selectors.iter().fold(
        (Vec::new(), HashSet::new()),
        |(mut steps, mut seen): (Vec<ApprovalStep>, HashSet<String>), selector| {
            let Some(node) = selector.resolve(requester, directory) else {
                tracing::debug!("  ⏭️ {:?} does not resolve for {}", selector, requester.email);
                return (steps, seen);
            };
            if node.email == terminal.email {
                return (steps, seen);
            }
            if !requester_email.is_empty() && node.email == requester_email {
                tracing::debug!("  ⏭️ {:?} resolves to the requester, skipping", selector);
                return (steps, seen);
            }
            if seen.insert(node.email.clone()) {
                steps.push(ApprovalStep::new(node.clone(), selector.step_role()));
            } else {
                tracing::debug!("  ⏭️ {} already in chain, dropping {:?}", node.email, selector);
            }
            (steps, seen)
        },
    );

    if terminal.email != requester_email {
        steps.push(ApprovalStep::new(terminal.clone(), StepRole::Compliance));
    }

    for (index, step) in steps.iter_mut().enumerate() {
        step.level = index as u32 + 1;
    }
    steps
}
