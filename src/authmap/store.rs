//! Access to the aws-auth ConfigMap
//!
//! [`AuthMapStore`] reads and writes whole documents. The Kubernetes API sits
//! behind [`ConfigMapApi`] so tests can swap in a mock or an in-memory store.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, ObjectMeta, PostParams};
use kube::Client;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use super::entry::AuthDocument;
use crate::{Error, AUTH_MAP_NAME, AUTH_MAP_NAMESPACE};

/// Trait abstracting the ConfigMap calls the store needs
///
/// Errors are raw kube errors; the store decides which ones mean "absent".
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConfigMapApi: Send + Sync {
    /// Get a ConfigMap, `Ok(None)` if it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>, kube::Error>;

    /// Create a ConfigMap
    async fn create(&self, namespace: &str, config_map: &ConfigMap)
        -> Result<ConfigMap, kube::Error>;

    /// Replace an existing ConfigMap
    async fn replace(
        &self,
        namespace: &str,
        name: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, kube::Error>;
}

/// Real Kubernetes implementation of [`ConfigMapApi`]
pub struct KubeConfigMapApi {
    client: Client,
}

impl KubeConfigMapApi {
    /// Create a new KubeConfigMapApi wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConfigMapApi for KubeConfigMapApi {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>, kube::Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await
    }

    async fn create(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, kube::Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), config_map).await
    }

    async fn replace(
        &self,
        namespace: &str,
        name: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, kube::Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        api.replace(name, &PostParams::default(), config_map).await
    }
}

/// The ConfigMap a document was read from, written back on persist.
///
/// Keeps the fetched `resourceVersion`, so the API server rejects a replace
/// that races a concurrent writer.
#[derive(Clone, Debug)]
pub struct StoreHandle {
    config_map: ConfigMap,
}

impl StoreHandle {
    /// Resource version observed at fetch time
    pub fn resource_version(&self) -> Option<&str> {
        self.config_map.metadata.resource_version.as_deref()
    }
}

/// Reads and writes the auth map as a whole document
#[derive(Clone)]
pub struct AuthMapStore {
    api: Arc<dyn ConfigMapApi>,
    namespace: String,
    name: String,
}

impl AuthMapStore {
    /// Store for the well-known `kube-system/aws-auth` ConfigMap
    pub fn new(api: Arc<dyn ConfigMapApi>) -> Self {
        Self::with_location(api, AUTH_MAP_NAMESPACE, AUTH_MAP_NAME)
    }

    /// Store for a ConfigMap at a custom location
    pub fn with_location(
        api: Arc<dyn ConfigMapApi>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Store backed by the cluster reachable through `client`
    pub fn from_client(client: Client) -> Self {
        Self::new(Arc::new(KubeConfigMapApi::new(client)))
    }

    /// Read the current document, creating an empty ConfigMap if none exists.
    pub async fn fetch(&self) -> Result<(AuthDocument, StoreHandle), Error> {
        let config_map = match self
            .api
            .get(&self.namespace, &self.name)
            .await
            .map_err(|e| Error::store("get", e))?
        {
            Some(cm) => cm,
            None => {
                info!(
                    namespace = %self.namespace,
                    name = %self.name,
                    "auth map missing, creating it"
                );
                let empty = ConfigMap {
                    metadata: ObjectMeta {
                        name: Some(self.name.clone()),
                        namespace: Some(self.namespace.clone()),
                        ..Default::default()
                    },
                    ..Default::default()
                };
                self.api
                    .create(&self.namespace, &empty)
                    .await
                    .map_err(|e| Error::store("create", e))?
            }
        };

        let document = AuthDocument::from_data(config_map.data.as_ref())?;
        debug!(
            roles = document.map_roles.len(),
            users = document.map_users.len(),
            "fetched auth map"
        );
        Ok((document, StoreHandle { config_map }))
    }

    /// Write `document` back through the ConfigMap it was fetched from.
    ///
    /// Data keys other than `mapRoles` / `mapUsers` (e.g. `mapAccounts`) are
    /// written back untouched.
    pub async fn persist(&self, document: &AuthDocument, handle: StoreHandle) -> Result<(), Error> {
        let mut config_map = handle.config_map;
        let mut data = config_map.data.take().unwrap_or_default();
        data.extend(document.to_data()?);
        config_map.data = Some(data);

        self.api
            .replace(&self.namespace, &self.name, &config_map)
            .await
            .map_err(|e| Error::store("replace", e))?;

        debug!(
            roles = document.map_roles.len(),
            users = document.map_users.len(),
            "persisted auth map"
        );
        Ok(())
    }
}
