/// Organization directory type definitions
///
/// `OrgNode` is the in-memory, normalised record of one person. `OrgDocument`
/// is the on-disk JSON shape the external configuration loader hands us.

use crate::workflow::chain::RoleSelector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single person in the organization
///
/// Identity key is the email, compared case-insensitively. Records are
/// immutable once a directory snapshot has been built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgNode {
    pub name: String,
    /// Normalised (trimmed, lower-case) email
    pub email: String,
    pub title: String,
    pub department: Option<String>,
    /// Reporting line by contact identity (normalised email)
    pub reports_to_email: Option<String>,
}

impl OrgNode {
    /// Placeholder record for a requester that is not listed in the directory
    pub fn unlisted(identity: &Identity) -> Self {
        let key = identity.key.trim();
        let email = if key.contains('@') {
            normalize_email(key)
        } else {
            String::new()
        };
        Self {
            name: key.to_string(),
            email,
            title: "Unlisted".to_string(),
            department: identity.department.clone(),
            reports_to_email: None,
        }
    }

    /// Case-insensitive identity comparison
    pub fn is(&self, email: &str) -> bool {
        !self.email.is_empty() && self.email == normalize_email(email)
    }
}

/// How a caller names a requester: an email or a display name, plus an
/// optional department hint used when the person is not in the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub key: String,
    #[serde(default)]
    pub department: Option<String>,
}

impl Identity {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            department: None,
        }
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }
}

/// Trim and lower-case an email for use as an index key
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// On-disk organization document
///
/// ```json
/// {
///   "executive": { "name": "Eve", "email": "eve@corp.example", "title": "Director" },
///   "terminalAuthority": { "name": "Carl", "email": "carl@corp.example", "title": "HR Compliance" },
///   "departments": [
///     { "name": "Ops", "head": { ... }, "positions": [ { ..., "reportsTo": "sam@corp.example" } ] }
///   ],
///   "recipes": { "leave": ["supervisor", "department_head", "executive", "compliance"] }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgDocument {
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub executive: Option<ContactEntry>,
    #[serde(default)]
    pub finance: Option<ContactEntry>,
    /// Always-last approver of every chain (compliance / HR)
    pub terminal_authority: ContactEntry,
    #[serde(default)]
    pub departments: Vec<DepartmentEntry>,
    /// Per-category selector lists overriding the built-in recipe book
    #[serde(default)]
    pub recipes: HashMap<String, Vec<RoleSelector>>,
}

/// A department with its head and named positions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentEntry {
    pub name: String,
    pub head: ContactEntry,
    #[serde(default)]
    pub positions: Vec<ContactEntry>,
}

/// A contact as written in the organization document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactEntry {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub reports_to: Option<String>,
}

impl ContactEntry {
    /// Normalise into an `OrgNode`, defaulting the department to `department`
    pub fn to_node(&self, department: Option<&str>) -> OrgNode {
        OrgNode {
            name: self.name.trim().to_string(),
            email: normalize_email(&self.email),
            title: self.title.clone(),
            department: self
                .department
                .clone()
                .or_else(|| department.map(str::to_string)),
            reports_to_email: self
                .reports_to
                .as_deref()
                .map(normalize_email)
                .filter(|email| !email.is_empty()),
        }
    }
}
