//! Custom Resource Definitions for the aws-auth operator
//!
//! Each resource declares one entry of the aws-auth ConfigMap. The controllers
//! read them through [`AuthMapping`] so both kinds share one reconciler.

mod map_role;
mod map_user;

pub use map_role::{MapRole, MapRoleSpec};
pub use map_user::{MapUser, MapUserSpec};

use kube::ResourceExt;

use crate::authmap::EntryKind;
use crate::Error;

/// A custom resource that declares one auth map entry
///
/// The resource name is the entry's username.
pub trait AuthMapping: ResourceExt {
    /// Auth map collection the resource belongs to
    fn entry_kind() -> EntryKind;

    /// IAM principal ARN
    fn arn(&self) -> &str;

    /// Kubernetes groups
    fn groups(&self) -> &[String];

    /// Validate the declared entry
    fn validate(&self) -> Result<(), Error> {
        if self.arn().is_empty() {
            return Err(Error::validation(format!(
                "{} '{}' has an empty ARN",
                Self::entry_kind(),
                self.name_any()
            )));
        }
        Ok(())
    }
}
