//! MapRole / MapUser controller implementation
//!
//! Both kinds share one reconciler. A live resource is upserted into the
//! aws-auth ConfigMap; a deleted one is removed before its finalizer is
//! released, so deletions are never missed while the operator is down.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::authmap::{AuthMapService, AuthMapStore, EntryKind, ServiceConfig};
use crate::crd::{AuthMapping, MapRole, MapUser};
use crate::Error;

/// Finalizer that holds a deleted resource until its entry is removed
pub const MAPPING_FINALIZER: &str = "awsauth.dev/cleanup";

/// Trait abstracting finalizer patches on MapRole / MapUser resources
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FinalizerClient: Send + Sync {
    /// Add `finalizer` to the named resource if it is not already present
    async fn add_finalizer(&self, kind: EntryKind, name: &str, finalizer: &str)
        -> Result<(), Error>;

    /// Remove `finalizer` from the named resource
    async fn remove_finalizer(
        &self,
        kind: EntryKind,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error>;
}

/// Real Kubernetes implementation of [`FinalizerClient`]
pub struct KubeFinalizerClient {
    client: Client,
}

impl KubeFinalizerClient {
    /// Create a new KubeFinalizerClient wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FinalizerClient for KubeFinalizerClient {
    async fn add_finalizer(
        &self,
        kind: EntryKind,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let add = |finalizers: &mut Vec<String>| {
            if finalizers.iter().any(|f| f == finalizer) {
                return false;
            }
            finalizers.push(finalizer.to_string());
            true
        };
        match kind {
            EntryKind::Role => {
                edit_finalizers(Api::<MapRole>::all(self.client.clone()), name, add).await
            }
            EntryKind::User => {
                edit_finalizers(Api::<MapUser>::all(self.client.clone()), name, add).await
            }
        }
    }

    async fn remove_finalizer(
        &self,
        kind: EntryKind,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let remove = |finalizers: &mut Vec<String>| {
            let before = finalizers.len();
            finalizers.retain(|f| f != finalizer);
            finalizers.len() != before
        };
        match kind {
            EntryKind::Role => {
                edit_finalizers(Api::<MapRole>::all(self.client.clone()), name, remove).await
            }
            EntryKind::User => {
                edit_finalizers(Api::<MapUser>::all(self.client.clone()), name, remove).await
            }
        }
    }
}

/// Read the resource's finalizers, apply `edit`, and patch them back if it
/// reports a change. A resource that is already gone needs no edit.
async fn edit_finalizers<K>(
    api: Api<K>,
    name: &str,
    edit: impl FnOnce(&mut Vec<String>) -> bool,
) -> Result<(), Error>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    let Some(obj) = api.get_opt(name).await? else {
        debug!(name = %name, "resource already deleted, skipping finalizer edit");
        return Ok(());
    };

    let mut finalizers = obj.meta().finalizers.clone().unwrap_or_default();
    if !edit(&mut finalizers) {
        return Ok(());
    }

    let patch = serde_json::json!({
        "metadata": {
            "finalizers": finalizers
        }
    });
    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Controller context shared by the MapRole and MapUser controllers
pub struct Context {
    /// Auth map operations
    pub service: AuthMapService,
    /// Finalizer patches (trait object for testability)
    pub finalizers: Arc<dyn FinalizerClient>,
}

impl Context {
    /// Create a context backed by the cluster reachable through `client`
    pub fn new(client: Client, config: ServiceConfig) -> Result<Self, Error> {
        Ok(Self {
            service: AuthMapService::new(AuthMapStore::from_client(client.clone()), config)?,
            finalizers: Arc::new(KubeFinalizerClient::new(client)),
        })
    }

    /// Create a context from explicit parts
    ///
    /// Primarily for tests, where neither piece talks to a real cluster.
    pub fn from_parts(service: AuthMapService, finalizers: Arc<dyn FinalizerClient>) -> Self {
        Self {
            service,
            finalizers,
        }
    }
}

/// Reconcile a MapRole or MapUser
///
/// # Returns
///
/// `await_change` once the ConfigMap matches the resource, a short requeue
/// after adding the finalizer, or an error for the error policy to retry.
#[instrument(skip(obj, ctx), fields(kind = %K::entry_kind(), username = %obj.name_any()))]
pub async fn reconcile<K>(obj: Arc<K>, ctx: Arc<Context>) -> Result<Action, Error>
where
    K: AuthMapping + Send + Sync + 'static,
{
    let username = obj.name_any();
    info!("reconciling mapping");

    if obj.meta().deletion_timestamp.is_some() {
        return handle_deletion(obj.as_ref(), &ctx).await;
    }

    if !has_finalizer(obj.as_ref()) {
        info!("adding finalizer");
        ctx.finalizers
            .add_finalizer(K::entry_kind(), &username, MAPPING_FINALIZER)
            .await?;
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    // Don't requeue for validation errors - they require spec changes
    if let Err(e) = obj.validate() {
        warn!(error = %e, "mapping validation failed");
        return Ok(Action::await_change());
    }

    let groups = obj.groups().to_vec();
    let outcome = match K::entry_kind() {
        EntryKind::Role => {
            ctx.service
                .upsert_map_role(&username, obj.arn(), groups)
                .await?
        }
        EntryKind::User => {
            ctx.service
                .upsert_map_user(&username, obj.arn(), groups)
                .await?
        }
    };

    debug!(%outcome, "upserted mapping");
    Ok(Action::await_change())
}

/// Remove the entry, then release the finalizer.
///
/// An entry that is already absent counts as removed.
async fn handle_deletion<K: AuthMapping>(obj: &K, ctx: &Context) -> Result<Action, Error> {
    if !has_finalizer(obj) {
        return Ok(Action::await_change());
    }

    let username = obj.name_any();
    let result = match K::entry_kind() {
        EntryKind::Role => ctx.service.remove_map_role(&username).await,
        EntryKind::User => ctx.service.remove_map_user(&username).await,
    };

    match result {
        Ok(_) => {
            info!("removed mapping from aws-auth");
        }
        Err(e) if e.is_not_found() => {
            info!("mapping already absent from aws-auth");
        }
        Err(e) => return Err(e),
    }

    ctx.finalizers
        .remove_finalizer(K::entry_kind(), &username, MAPPING_FINALIZER)
        .await?;
    Ok(Action::await_change())
}

fn has_finalizer<K: Resource>(obj: &K) -> bool {
    obj.meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|s| s == MAPPING_FINALIZER))
}

/// Error policy for the mapping controllers
///
/// Logs the error and requeues for retry after 30 seconds.
pub fn error_policy<K: AuthMapping>(obj: Arc<K>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        kind = %K::entry_kind(),
        username = %obj.name_any(),
        "reconciliation failed"
    );
    Action::requeue(Duration::from_secs(30))
}
