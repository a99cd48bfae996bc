//! Synchronization engine for the aws-auth ConfigMap
//!
//! The ConfigMap holds two YAML lists: `mapRoles` maps IAM roles to Kubernetes
//! identities and `mapUsers` maps IAM users. Callers request one upsert or
//! removal at a time; the engine converges the shared document without
//! dropping unrelated entries.
//!
//! # Layers
//!
//! - [`RoleEntry`] / [`UserEntry`] - entry values, plus [`SyncRequest`]
//! - [`codec`] - YAML encoding of each list
//! - [`AuthMapStore`] - fetch / persist of the whole document
//! - [`merge()`] - pure upsert / remove over a fetched document
//! - [`AuthMapService`] - the public operations, run under a retry budget

pub mod codec;
mod entry;
mod merge;
mod service;
mod store;

pub use entry::{
    AuthDocument, AuthEntry, EntryKind, Operation, RoleEntry, SyncRequest, UserEntry,
};
pub use merge::{merge, MergeOutcome};
pub use service::{sync, AuthMapService, ServiceConfig, SyncOutcome};
pub use store::{AuthMapStore, ConfigMapApi, KubeConfigMapApi, StoreHandle};

#[cfg(test)]
pub(crate) use service::tests::FakeConfigMaps;
