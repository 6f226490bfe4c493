/// Organization Directory Layer
///
/// Read-only view of the organization used to resolve approvers:
/// - Type definitions (OrgNode, OrgDocument, Identity)
/// - Immutable indexed snapshot with reporting-line validation
/// - Hot-reload registry using ArcSwap

pub mod types;

pub mod snapshot;

pub mod registry;

pub use registry::DirectoryRegistry;
pub use snapshot::OrgDirectory;
pub use types::{Identity, OrgDocument, OrgNode};
