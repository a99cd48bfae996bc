//! awsauth - keeps the EKS `aws-auth` ConfigMap in sync with declared mappings
//!
//! The `aws-auth` ConfigMap in `kube-system` maps IAM roles and users to
//! Kubernetes identities. This crate owns the read-merge-write cycle against
//! that shared document and drives it from `MapRole` / `MapUser` resources.
//!
//! # Modules
//!
//! - [`authmap`] - entry model, YAML codec, store adapter, merge engine and
//!   the public upsert / remove operations
//! - [`retry`] - exponential backoff with jitter around whole sync attempts
//! - [`crd`] - Custom Resource Definitions (MapRole, MapUser)
//! - [`controller`] - Kubernetes controller reconciliation logic
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod authmap;
pub mod controller;
pub mod crd;
pub mod error;
pub mod retry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Auth map location
// =============================================================================

/// Name of the ConfigMap EKS reads IAM mappings from
pub const AUTH_MAP_NAME: &str = "aws-auth";

/// Namespace of the auth map ConfigMap
pub const AUTH_MAP_NAMESPACE: &str = "kube-system";

/// Data key holding the YAML list of role mappings
pub const MAP_ROLES_KEY: &str = "mapRoles";

/// Data key holding the YAML list of user mappings
pub const MAP_USERS_KEY: &str = "mapUsers";
