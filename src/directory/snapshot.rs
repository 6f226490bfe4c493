/// Immutable, indexed snapshot of the organization
///
/// Built once from an `OrgDocument`. Every query is a pure read: an
/// email index (O(1) lookup), a display-name index and a department -> head
/// index. Reporting lines are validated as an acyclic graph at build time
/// so that walking "reports to" links can never loop.

use crate::directory::types::{normalize_email, ContactEntry, OrgDocument, OrgNode};
use crate::workflow::chain::RoleSelector;
use anyhow::Result;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct OrgDirectory {
    organization: Option<String>,
    /// Key: normalised email
    nodes: HashMap<String, OrgNode>,
    /// Key: lower-case display name, value: email
    names: HashMap<String, String>,
    /// Key: lower-case department name, value: email of the head
    department_heads: HashMap<String, String>,
    executive: Option<String>,
    finance: Option<String>,
    terminal_authority: OrgNode,
    recipes: HashMap<String, Vec<RoleSelector>>,
}

impl OrgDirectory {
    /// Build and validate a snapshot from a parsed document
    ///
    /// Fails on malformed emails and on reporting-line cycles. A contact
    /// listed more than once keeps its first record; later listings only
    /// add index entries (e.g. the HR head who is also the terminal authority).
    pub fn from_document(document: OrgDocument) -> Result<Self> {
        let mut nodes: HashMap<String, OrgNode> = HashMap::new();
        let mut names: HashMap<String, String> = HashMap::new();
        let mut department_heads = HashMap::new();

        let mut insert = |entry: &ContactEntry, department: Option<&str>| -> Result<String> {
            let node = entry.to_node(department);
            if node.email.is_empty() || !node.email.contains('@') {
                return Err(anyhow::anyhow!(
                    "Contact '{}' has an invalid email: '{}'",
                    entry.name,
                    entry.email
                ));
            }
            let email = node.email.clone();
            if nodes.contains_key(&email) {
                tracing::debug!("Contact {} listed more than once, keeping first record", email);
            } else {
                let name_key = node.name.to_lowercase();
                if let Some(existing) = names.get(&name_key) {
                    tracing::warn!(
                        "Display name '{}' is shared by {} and {}, name lookups resolve to the first",
                        node.name,
                        existing,
                        email
                    );
                } else {
                    names.insert(name_key, email.clone());
                }
                nodes.insert(email.clone(), node);
            }
            Ok(email)
        };

        for department in &document.departments {
            let head = insert(&department.head, Some(&department.name))?;
            department_heads.insert(department.name.trim().to_lowercase(), head);
            for position in &department.positions {
                insert(position, Some(&department.name))?;
            }
        }

        let executive = document
            .executive
            .as_ref()
            .map(|entry| insert(entry, None))
            .transpose()?;
        let finance = document
            .finance
            .as_ref()
            .map(|entry| insert(entry, None))
            .transpose()?;
        let terminal_email = insert(&document.terminal_authority, None)?;

        validate_reporting_lines(&nodes)?;

        let terminal_authority = nodes
            .get(&terminal_email)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Terminal authority {} missing after load", terminal_email))?;

        let recipes = document
            .recipes
            .into_iter()
            .map(|(category, selectors)| (category.trim().to_lowercase(), selectors))
            .collect();

        Ok(Self {
            organization: document.organization,
            nodes,
            names,
            department_heads,
            executive,
            finance,
            terminal_authority,
            recipes,
        })
    }

    /// Resolve a person by email or display name (both case-insensitive)
    pub fn lookup(&self, identity: &str) -> Option<&OrgNode> {
        let key = identity.trim();
        if key.is_empty() {
            return None;
        }
        if let Some(node) = self.nodes.get(&normalize_email(key)) {
            return Some(node);
        }
        self.names
            .get(&key.to_lowercase())
            .and_then(|email| self.nodes.get(email))
    }

    pub fn department_head(&self, department: &str) -> Option<&OrgNode> {
        self.department_heads
            .get(&department.trim().to_lowercase())
            .and_then(|email| self.nodes.get(email))
    }

    /// The always-last approver (compliance / HR)
    pub fn terminal_authority(&self) -> &OrgNode {
        &self.terminal_authority
    }

    pub fn executive(&self) -> Option<&OrgNode> {
        self.executive.as_ref().and_then(|email| self.nodes.get(email))
    }

    pub fn finance(&self) -> Option<&OrgNode> {
        self.finance.as_ref().and_then(|email| self.nodes.get(email))
    }

    /// Direct supervisor along the reporting line, if it resolves
    pub fn supervisor_of(&self, node: &OrgNode) -> Option<&OrgNode> {
        node.reports_to_email
            .as_ref()
            .and_then(|email| self.nodes.get(email))
    }

    /// Category recipes declared in the organization document
    pub fn recipes(&self) -> &HashMap<String, Vec<RoleSelector>> {
        &self.recipes
    }

    pub fn organization(&self) -> Option<&str> {
        self.organization.as_deref()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Reject reporting-line cycles (including self-reports)
///
/// Links pointing at unknown emails are left in place; they simply do not
/// resolve when a chain is built.
fn validate_reporting_lines(nodes: &HashMap<String, OrgNode>) -> Result<()> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();

    for email in nodes.keys() {
        index.insert(email.as_str(), graph.add_node(email.as_str()));
    }

    for node in nodes.values() {
        let Some(target) = node.reports_to_email.as_deref() else {
            continue;
        };
        match index.get(target) {
            Some(&to) => {
                graph.add_edge(index[node.email.as_str()], to, ());
            }
            None => {
                tracing::warn!(
                    "⚠️ {} reports to unknown contact {}, link will not resolve",
                    node.email,
                    target
                );
            }
        }
    }

    toposort(&graph, None).map_err(|cycle| {
        anyhow::anyhow!(
            "Reporting lines form a cycle through {}",
            graph[cycle.node_id()]
        )
    })?;

    Ok(())
}
