//! YAML encoding of the auth map collections
//!
//! Each ConfigMap data key holds an independently encoded YAML sequence. A
//! missing or blank key is an empty collection, never an error.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::entry::AuthDocument;
use crate::{Error, MAP_ROLES_KEY, MAP_USERS_KEY};

/// Decode one collection. `key` only labels errors.
pub fn decode<T: DeserializeOwned>(key: &str, raw: Option<&str>) -> Result<Vec<T>, Error> {
    let raw = match raw {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return Ok(Vec::new()),
    };

    // `null` / `~` decode to None
    serde_yaml::from_str::<Option<Vec<T>>>(raw)
        .map(Option::unwrap_or_default)
        .map_err(|e| Error::decode(key, e.to_string()))
}

/// Encode one collection, preserving entry order.
pub fn encode<T: Serialize>(entries: &[T]) -> Result<String, Error> {
    serde_yaml::to_string(entries).map_err(|e| Error::encode(e.to_string()))
}

impl AuthDocument {
    /// Decode a document from ConfigMap data
    pub fn from_data(data: Option<&BTreeMap<String, String>>) -> Result<Self, Error> {
        let field = |key: &str| data.and_then(|d| d.get(key)).map(String::as_str);
        Ok(Self {
            map_roles: decode(MAP_ROLES_KEY, field(MAP_ROLES_KEY))?,
            map_users: decode(MAP_USERS_KEY, field(MAP_USERS_KEY))?,
        })
    }

    /// Encode the document as ConfigMap data
    pub fn to_data(&self) -> Result<BTreeMap<String, String>, Error> {
        Ok(BTreeMap::from([
            (MAP_ROLES_KEY.to_string(), encode(&self.map_roles)?),
            (MAP_USERS_KEY.to_string(), encode(&self.map_users)?),
        ]))
    }
}
