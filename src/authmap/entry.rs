//! Auth map entries and synchronization requests

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;
use crate::Error;

/// Which collection of the auth map a request targets
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// `mapRoles`: IAM roles, upserted by username
    Role,
    /// `mapUsers`: IAM users, upserted by ARN
    User,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Role => write!(f, "mapRole"),
            EntryKind::User => write!(f, "mapUser"),
        }
    }
}

/// Behaviour shared by both entry kinds, used by the merge engine.
///
/// `upsert_key` differs per kind: roles match on username, users on ARN.
/// Removal always matches on username.
pub trait AuthEntry: Clone + PartialEq {
    /// Build an entry from request fields
    fn new(arn: String, username: String, groups: Vec<String>) -> Self;

    /// Field an upsert looks the entry up by
    fn upsert_key(&self) -> &str;

    /// Field an upsert overwrites alongside `groups`
    fn companion(&self) -> &str;

    /// Replace the companion field
    fn set_companion(&mut self, value: String);

    /// Kubernetes username
    fn username(&self) -> &str;

    /// Kubernetes groups
    fn groups(&self) -> &[String];

    /// Replace the groups
    fn set_groups(&mut self, groups: Vec<String>);
}

/// One element of `mapRoles`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleEntry {
    /// ARN of the IAM role
    pub rolearn: String,
    /// Kubernetes username the role maps to
    pub username: String,
    /// Kubernetes groups
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

impl AuthEntry for RoleEntry {
    fn new(arn: String, username: String, groups: Vec<String>) -> Self {
        Self {
            rolearn: arn,
            username,
            groups,
        }
    }

    fn upsert_key(&self) -> &str {
        &self.username
    }

    fn companion(&self) -> &str {
        &self.rolearn
    }

    fn set_companion(&mut self, value: String) {
        self.rolearn = value;
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn groups(&self) -> &[String] {
        &self.groups
    }

    fn set_groups(&mut self, groups: Vec<String>) {
        self.groups = groups;
    }
}

/// One element of `mapUsers`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    /// ARN of the IAM user
    pub userarn: String,
    /// Kubernetes username the user maps to
    pub username: String,
    /// Kubernetes groups
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

impl AuthEntry for UserEntry {
    fn new(arn: String, username: String, groups: Vec<String>) -> Self {
        Self {
            userarn: arn,
            username,
            groups,
        }
    }

    fn upsert_key(&self) -> &str {
        &self.userarn
    }

    fn companion(&self) -> &str {
        &self.username
    }

    fn set_companion(&mut self, value: String) {
        self.username = value;
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn groups(&self) -> &[String] {
        &self.groups
    }

    fn set_groups(&mut self, groups: Vec<String>) {
        self.groups = groups;
    }
}

/// Full contents of the aws-auth ConfigMap
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthDocument {
    /// `mapRoles` entries in stored order
    pub map_roles: Vec<RoleEntry>,
    /// `mapUsers` entries in stored order
    pub map_users: Vec<UserEntry>,
}

/// Requested change to the auth map
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Insert the entry, or update it in place
    Upsert {
        /// ARN of the IAM principal
        arn: String,
        /// Groups to grant
        groups: Vec<String>,
    },
    /// Delete every entry with the request's username
    Remove,
}

/// A single upsert or removal against one collection
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncRequest {
    /// Target collection
    pub kind: EntryKind,
    /// Kubernetes username of the entry
    pub username: String,
    /// What to do with it
    pub operation: Operation,
    /// Retry budget; `None` makes exactly one attempt
    pub retry: Option<RetryConfig>,
}

impl SyncRequest {
    /// Request an upsert
    pub fn upsert(
        kind: EntryKind,
        username: impl Into<String>,
        arn: impl Into<String>,
        groups: Vec<String>,
    ) -> Self {
        Self {
            kind,
            username: username.into(),
            operation: Operation::Upsert {
                arn: arn.into(),
                groups,
            },
            retry: None,
        }
    }

    /// Request a removal
    pub fn remove(kind: EntryKind, username: impl Into<String>) -> Self {
        Self {
            kind,
            username: username.into(),
            operation: Operation::Remove,
            retry: None,
        }
    }

    /// Attach a retry budget
    pub fn with_retry(mut self, retry: Option<RetryConfig>) -> Self {
        self.retry = retry;
        self
    }

    /// Check the request before any store access
    pub fn validate(&self) -> Result<(), Error> {
        if self.username.is_empty() {
            return Err(Error::validation("username not provided"));
        }
        if let Operation::Upsert { arn, .. } = &self.operation {
            if arn.is_empty() {
                return Err(Error::validation(match self.kind {
                    EntryKind::Role => "role arn not provided",
                    EntryKind::User => "user arn not provided",
                }));
            }
        }
        if let Some(retry) = &self.retry {
            retry.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display_matches_configmap_vocabulary() {
        assert_eq!(EntryKind::Role.to_string(), "mapRole");
        assert_eq!(EntryKind::User.to_string(), "mapUser");
    }

    #[test]
    fn roles_are_keyed_by_username_users_by_arn() {
        let role = RoleEntry::new("arn:role".into(), "node".into(), vec![]);
        assert_eq!(role.upsert_key(), "node");
        assert_eq!(role.companion(), "arn:role");

        let user = UserEntry::new("arn:user".into(), "admin".into(), vec![]);
        assert_eq!(user.upsert_key(), "arn:user");
        assert_eq!(user.companion(), "admin");
    }

    #[test]
    fn upsert_requires_username_and_arn() {
        assert!(SyncRequest::upsert(EntryKind::Role, "", "arn", vec![])
            .validate()
            .is_err());

        let err = SyncRequest::upsert(EntryKind::User, "admin", "", vec![])
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("user arn not provided"));

        assert!(SyncRequest::upsert(EntryKind::Role, "n", "arn", vec![])
            .validate()
            .is_ok());
    }

    #[test]
    fn remove_needs_only_a_username() {
        assert!(SyncRequest::remove(EntryKind::Role, "node-1")
            .validate()
            .is_ok());
        assert!(SyncRequest::remove(EntryKind::Role, "").validate().is_err());
    }

    #[test]
    fn invalid_retry_budget_is_rejected() {
        let req = SyncRequest::remove(EntryKind::User, "admin")
            .with_retry(Some(RetryConfig::with_max_attempts(0)));
        assert!(matches!(req.validate(), Err(Error::Validation(_))));
    }
}
