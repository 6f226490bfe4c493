/// Configuration management for the Approvalway service
///
/// Handles server configuration, storage location, directory source,
/// workflow policy and notification settings. Every value can be set
/// through an `APPROVALWAY_*` environment variable.

use crate::workflow::{policy::AuthorizationPolicy, types::ActorRole};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Organization directory source
    pub directory: DirectoryConfig,
    /// Privileged roles and auto-escalation
    pub workflow: WorkflowConfig,
    /// Event delivery
    pub notifications: NotificationConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding approvals.db (default: "data")
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Path of the organization JSON document
    pub org_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub override_roles: Vec<ActorRole>,
    pub on_behalf_roles: Vec<ActorRole>,
    /// Six-field cron expression for the stale-step sweep
    pub escalation_schedule: String,
    /// Hours a step may stay pending before auto-escalation (0 disables)
    pub escalation_after_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub timeout_ms: u64,
    pub webhook_url: Option<String>,
}

impl WorkflowConfig {
    pub fn policy(&self) -> AuthorizationPolicy {
        AuthorizationPolicy {
            override_roles: self.override_roles.iter().copied().collect::<HashSet<_>>(),
            on_behalf_roles: self.on_behalf_roles.iter().copied().collect::<HashSet<_>>(),
        }
    }

    pub fn auto_escalation_enabled(&self) -> bool {
        self.escalation_after_hours > 0
    }
}

impl NotificationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("APPROVALWAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("APPROVALWAY_PORT")
                    .unwrap_or_else(|_| "3005".to_string())
                    .parse()
                    .unwrap_or(3005),
            },
            database: DatabaseConfig {
                data_dir: std::env::var("APPROVALWAY_DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            },
            directory: DirectoryConfig {
                org_file: std::env::var("APPROVALWAY_ORG_FILE")
                    .unwrap_or_else(|_| "org.json".to_string()),
            },
            workflow: WorkflowConfig {
                override_roles: roles_from_env("APPROVALWAY_OVERRIDE_ROLES"),
                on_behalf_roles: roles_from_env("APPROVALWAY_ON_BEHALF_ROLES"),
                escalation_schedule: std::env::var("APPROVALWAY_ESCALATION_SCHEDULE")
                    .unwrap_or_else(|_| "0 0 * * * *".to_string()),
                escalation_after_hours: std::env::var("APPROVALWAY_ESCALATION_AFTER_HOURS")
                    .unwrap_or_else(|_| "72".to_string())
                    .parse()
                    .unwrap_or(72),
            },
            notifications: NotificationConfig {
                timeout_ms: std::env::var("APPROVALWAY_NOTIFY_TIMEOUT_MS")
                    .unwrap_or_else(|_| "5000".to_string())
                    .parse()
                    .unwrap_or(5000),
                webhook_url: std::env::var("APPROVALWAY_NOTIFY_WEBHOOK")
                    .ok()
                    .filter(|url| !url.trim().is_empty()),
            },
        }
    }
}

const DEFAULT_PRIVILEGED: &str = "hr,compliance,admin";

fn roles_from_env(key: &str) -> Vec<ActorRole> {
    let raw = std::env::var(key).unwrap_or_else(|_| DEFAULT_PRIVILEGED.to_string());
    parse_roles(&raw)
}

/// Comma-separated role list; unknown names are logged and skipped
fn parse_roles(raw: &str) -> Vec<ActorRole> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<ActorRole>() {
            Ok(role) => Some(role),
            Err(e) => {
                tracing::warn!("⚠️ Ignoring role in configuration: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_lists_skip_unknown_names() {
        assert_eq!(
            parse_roles("hr, Admin,,wizard"),
            vec![ActorRole::Hr, ActorRole::Admin]
        );
    }

    #[test]
    fn policy_reflects_configured_roles() {
        let workflow = WorkflowConfig {
            override_roles: vec![ActorRole::Admin],
            on_behalf_roles: vec![ActorRole::Hr, ActorRole::Compliance],
            escalation_schedule: "0 0 * * * *".to_string(),
            escalation_after_hours: 0,
        };
        let policy = workflow.policy();
        assert!(policy.override_roles.contains(&ActorRole::Admin));
        assert!(!policy.override_roles.contains(&ActorRole::Hr));
        assert_eq!(policy.on_behalf_roles.len(), 2);
        assert!(!workflow.auto_escalation_enabled());
    }
}
