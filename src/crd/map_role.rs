//! MapRole Custom Resource Definition
//!
//! A MapRole declares one `mapRoles` entry of the aws-auth ConfigMap. The
//! object name is the Kubernetes username the role maps to.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::AuthMapping;
use crate::authmap::EntryKind;

/// Specification for a MapRole
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "awsauth.dev",
    version = "v1beta1",
    kind = "MapRole",
    plural = "maproles",
    shortname = "mr",
    printcolumn = r#"{"name":"Role ARN","type":"string","jsonPath":".spec.rolearn"}"#,
    printcolumn = r#"{"name":"Groups","type":"string","jsonPath":".spec.groups"}"#,
    printcolumn = r#"{"name":"Email","type":"string","jsonPath":".spec.email"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct MapRoleSpec {
    /// ARN of the IAM role
    pub rolearn: String,

    /// Kubernetes groups granted to the role
    #[serde(default)]
    pub groups: Vec<String>,

    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Contact email for whoever owns the role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl AuthMapping for MapRole {
    fn entry_kind() -> EntryKind {
        EntryKind::Role
    }

    fn arn(&self) -> &str {
        &self.spec.rolearn
    }

    fn groups(&self) -> &[String] {
        &self.spec.groups
    }
}
