//! Synchronization façade over the aws-auth ConfigMap
//!
//! Every operation runs one fetch → merge → persist cycle, repeated under the
//! configured retry budget. The service keeps no state between calls; the
//! document is fetched fresh on every attempt.

use std::fmt;

use tracing::{info, warn};

use super::entry::{EntryKind, Operation, SyncRequest};
use super::merge::merge;
use super::store::AuthMapStore;
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::Error;

/// Whether a synchronization call modified the auth map
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The document was updated and persisted
    Changed,
    /// The document already matched; nothing was written
    Unchanged,
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::Changed => write!(f, "changed"),
            SyncOutcome::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Configuration for an [`AuthMapService`]
#[derive(Clone, Debug, Default)]
pub struct ServiceConfig {
    /// Retry budget for every operation; `None` makes a single attempt
    pub retry: Option<RetryConfig>,
}

/// Upserts and removes aws-auth entries
#[derive(Clone)]
pub struct AuthMapService {
    store: AuthMapStore,
    config: ServiceConfig,
}

impl AuthMapService {
    /// Create a service, rejecting a retry budget below one attempt
    pub fn new(store: AuthMapStore, config: ServiceConfig) -> Result<Self, Error> {
        if let Some(retry) = &config.retry {
            retry.validate()?;
        }
        Ok(Self { store, config })
    }

    /// Upsert a mapRole keyed by username
    pub async fn upsert_map_role(
        &self,
        username: &str,
        role_arn: &str,
        groups: Vec<String>,
    ) -> Result<SyncOutcome, Error> {
        self.run(SyncRequest::upsert(EntryKind::Role, username, role_arn, groups))
            .await
    }

    /// Remove the mapRole with the given username
    pub async fn remove_map_role(&self, username: &str) -> Result<SyncOutcome, Error> {
        self.run(SyncRequest::remove(EntryKind::Role, username))
            .await
    }

    /// Upsert a mapUser keyed by user ARN
    pub async fn upsert_map_user(
        &self,
        username: &str,
        user_arn: &str,
        groups: Vec<String>,
    ) -> Result<SyncOutcome, Error> {
        self.run(SyncRequest::upsert(EntryKind::User, username, user_arn, groups))
            .await
    }

    /// Remove every mapUser with the given username
    pub async fn remove_map_user(&self, username: &str) -> Result<SyncOutcome, Error> {
        self.run(SyncRequest::remove(EntryKind::User, username))
            .await
    }

    /// Run an arbitrary request under this service's retry budget
    pub async fn run(&self, request: SyncRequest) -> Result<SyncOutcome, Error> {
        let request = request.with_retry(self.config.retry.clone());
        sync(&self.store, &request).await
    }
}

/// Apply `request` to the store, retrying per `request.retry`.
pub async fn sync(store: &AuthMapStore, request: &SyncRequest) -> Result<SyncOutcome, Error> {
    request.validate()?;

    let result = match &request.retry {
        Some(retry) => {
            let operation_name = format!("{} {}", verb(&request.operation), request.kind);
            retry_with_backoff(retry, &operation_name, || sync_once(store, request)).await
        }
        None => sync_once(store, request).await,
    };

    match &result {
        Ok(SyncOutcome::Changed) => {
            info!(
                kind = %request.kind,
                username = %request.username,
                "{} with username '{}' has been updated",
                request.kind,
                request.username
            );
        }
        Ok(SyncOutcome::Unchanged) => {
            info!(
                kind = %request.kind,
                username = %request.username,
                "no updates needed to {} with username '{}'",
                request.kind,
                request.username
            );
        }
        Err(e) => {
            warn!(
                kind = %request.kind,
                username = %request.username,
                error = %e,
                "failed to {} {}",
                verb(&request.operation),
                request.kind
            );
        }
    }
    result
}

/// One fetch → merge → persist cycle
async fn sync_once(store: &AuthMapStore, request: &SyncRequest) -> Result<SyncOutcome, Error> {
    let (document, handle) = store.fetch().await?;
    let outcome = merge(document, request)?;

    if !outcome.changed {
        return Ok(SyncOutcome::Unchanged);
    }

    store.persist(&outcome.document, handle).await?;
    Ok(SyncOutcome::Changed)
}

fn verb(operation: &Operation) -> &'static str {
    match operation {
        Operation::Upsert { .. } => "upsert",
        Operation::Remove => "remove",
    }
}
