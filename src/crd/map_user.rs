//! MapUser Custom Resource Definition
//!
//! A MapUser declares one `mapUsers` entry of the aws-auth ConfigMap. The
//! object name is the Kubernetes username the IAM user maps to.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::AuthMapping;
use crate::authmap::EntryKind;

/// Specification for a MapUser
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "awsauth.dev",
    version = "v1beta1",
    kind = "MapUser",
    plural = "mapusers",
    shortname = "mu",
    printcolumn = r#"{"name":"User ARN","type":"string","jsonPath":".spec.userarn"}"#,
    printcolumn = r#"{"name":"Groups","type":"string","jsonPath":".spec.groups"}"#,
    printcolumn = r#"{"name":"Email","type":"string","jsonPath":".spec.email"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct MapUserSpec {
    /// ARN of the IAM user
    pub userarn: String,

    /// Kubernetes groups granted to the user
    #[serde(default)]
    pub groups: Vec<String>,

    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Contact email for whoever owns the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl AuthMapping for MapUser {
    fn entry_kind() -> EntryKind {
        EntryKind::User
    }

    fn arn(&self) -> &str {
        &self.spec.userarn
    }

    fn groups(&self) -> &[String] {
        &self.spec.groups
    }
}
