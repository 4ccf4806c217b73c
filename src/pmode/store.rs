#![forbid(unsafe_code)]

//! PMode and MPC stores.
//!
//! Both stores follow the same locking discipline: a process-wide
//! reader/writer lock over an in-memory view, with writes also pushed to an
//! external durable key-value collaborator. Reads proceed concurrently;
//! writes are exclusive.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use super::{PMode, PModeValidationError};

/// Default MPC assigned when a message names none (ebMS3 core).
pub const DEFAULT_MPC: &str =
    "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/defaultMPC";

/// Durable keyed storage collaborator. A write-ahead-log-backed map is
/// sufficient; this crate ships an in-memory implementation for tests and
/// embedding.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn put(&self, key: &str, value: JsonValue) -> Result<(), KvStoreError>;
    async fn get(&self, key: &str) -> Result<Option<JsonValue>, KvStoreError>;
    async fn remove(&self, key: &str) -> Result<bool, KvStoreError>;
    async fn all(&self) -> Result<Vec<(String, JsonValue)>, KvStoreError>;
}

#[derive(Debug, Error)]
#[error("key-value store error: {0}")]
pub struct KvStoreError(pub String);

#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    inner: RwLock<HashMap<String, JsonValue>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn put(&self, key: &str, value: JsonValue) -> Result<(), KvStoreError> {
        self.inner.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<JsonValue>, KvStoreError> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<bool, KvStoreError> {
        Ok(self.inner.write().await.remove(key).is_some())
    }

    async fn all(&self) -> Result<Vec<(String, JsonValue)>, KvStoreError> {
        Ok(self
            .inner
            .read()
            .await
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

#[derive(Debug, Error)]
pub enum PModeStoreError {
    #[error(transparent)]
    Invalid(#[from] PModeValidationError),
    #[error("pmode `{id}` already exists")]
    Duplicate { id: String },
    #[error(transparent)]
    Backing(#[from] KvStoreError),
    #[error("pmode serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Outcome of an `update` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// Target absent or already soft-deleted; nothing was written.
    Unchanged,
}

pub struct PModeStore {
    cache: RwLock<HashMap<String, Arc<PMode>>>,
    backing: Arc<dyn KeyValueStore>,
    debug_mode: bool,
}

impl PModeStore {
    pub fn new(backing: Arc<dyn KeyValueStore>, debug_mode: bool) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            backing,
            debug_mode,
        }
    }

    /// Warms the in-memory view from the durable collaborator.
    pub async fn load(&self) -> Result<usize, PModeStoreError> {
        let entries = self.backing.all().await?;
        let mut cache = self.cache.write().await;
        cache.clear();
        for (key, value) in entries {
            let pmode: PMode = serde_json::from_value(value)?;
            cache.insert(key, Arc::new(pmode));
        }
        let loaded = cache.len();
        drop(cache);

        tracing::info!(
            target: "msh::pmode",
            event = "pmode_store_loaded",
            pmodes = loaded
        );
        Ok(loaded)
    }

    pub async fn create(&self, mut pmode: PMode) -> Result<Arc<PMode>, PModeStoreError> {
        pmode
            .validate(self.debug_mode)
            .map_err(PModeValidationError::new)?;

        let mut cache = self.cache.write().await;
        if cache.contains_key(&pmode.id) {
            return Err(PModeStoreError::Duplicate {
                id: pmode.id.clone(),
            });
        }

        pmode.metadata.created_at = Some(Utc::now());
        pmode.metadata.modified_at = None;
        pmode.metadata.deleted = false;

        let stored = Arc::new(pmode);
        self.persist(&stored).await?;
        cache.insert(stored.id.clone(), Arc::clone(&stored));

        tracing::info!(
            target: "msh::pmode",
            event = "pmode_created",
            pmode = %stored.id
        );
        Ok(stored)
    }

    /// Wholesale replacement. Returns `Unchanged` without writing when the
    /// target does not exist or is already soft-deleted.
    pub async fn update(&self, pmode: PMode) -> Result<UpdateOutcome, PModeStoreError> {
        let mut cache = self.cache.write().await;
        let existing = match cache.get(&pmode.id) {
            Some(existing) if !existing.metadata.deleted => Arc::clone(existing),
            _ => return Ok(UpdateOutcome::Unchanged),
        };

        let stored = self.replace(&mut cache, pmode, &existing).await?;
        tracing::info!(
            target: "msh::pmode",
            event = "pmode_updated",
            pmode = %stored.id
        );
        Ok(UpdateOutcome::Updated)
    }

    /// Validates and writes the replacement, carrying the original creation
    /// timestamp and clearing any soft-delete mark. Caller holds the write
    /// lock.
    async fn replace(
        &self,
        cache: &mut HashMap<String, Arc<PMode>>,
        mut pmode: PMode,
        existing: &PMode,
    ) -> Result<Arc<PMode>, PModeStoreError> {
        pmode
            .validate(self.debug_mode)
            .map_err(PModeValidationError::new)?;

        pmode.metadata.created_at = existing.metadata.created_at;
        pmode.metadata.modified_at = Some(Utc::now());
        pmode.metadata.deleted = false;

        let stored = Arc::new(pmode);
        self.persist(&stored).await?;
        cache.insert(stored.id.clone(), Arc::clone(&stored));
        Ok(stored)
    }

    pub async fn delete(&self, id: &str) -> Result<bool, PModeStoreError> {
        let mut cache = self.cache.write().await;
        let removed = cache.remove(id).is_some();
        if removed {
            self.backing.remove(id).await?;
            tracing::info!(target: "msh::pmode", event = "pmode_deleted", pmode = id);
        }
        Ok(removed)
    }

    pub async fn soft_delete(&self, id: &str) -> Result<bool, PModeStoreError> {
        let mut cache = self.cache.write().await;
        let Some(existing) = cache.get(id) else {
            return Ok(false);
        };
        if existing.metadata.deleted {
            return Ok(false);
        }

        let mut replacement = (**existing).clone();
        replacement.metadata.deleted = true;
        replacement.metadata.modified_at = Some(Utc::now());

        let stored = Arc::new(replacement);
        self.persist(&stored).await?;
        cache.insert(stored.id.clone(), stored);

        tracing::info!(target: "msh::pmode", event = "pmode_soft_deleted", pmode = id);
        Ok(true)
    }

    pub async fn get_by_id(&self, id: &str) -> Option<Arc<PMode>> {
        self.cache
            .read()
            .await
            .get(id)
            .filter(|pmode| !pmode.metadata.deleted)
            .cloned()
    }

    pub async fn find<F>(&self, predicate: F) -> Vec<Arc<PMode>>
    where
        F: Fn(&PMode) -> bool,
    {
        self.cache
            .read()
            .await
            .values()
            .filter(|pmode| !pmode.metadata.deleted && predicate(pmode))
            .cloned()
            .collect()
    }

    /// Either leg may carry the (service, action) pair: a two-way reply
    /// arrives with leg 2's business info.
    pub async fn find_by_service_and_action(
        &self,
        service: &str,
        action: &str,
    ) -> Vec<Arc<PMode>> {
        self.find(|pmode| {
            [pmode.leg1.as_ref(), pmode.leg2.as_ref()]
                .into_iter()
                .flatten()
                .any(|leg| {
                    leg.business_info.service.as_deref() == Some(service)
                        && leg.business_info.action.as_deref() == Some(action)
                })
        })
        .await
    }

    /// Finds an existing PMode by (id, initiator identity, responder
    /// identity) and updates it, creating it otherwise. A soft-deleted
    /// match is a valid update target: the replacement clears the deleted
    /// mark and the PMode becomes visible again.
    pub async fn create_or_update(&self, pmode: PMode) -> Result<Arc<PMode>, PModeStoreError> {
        let mut cache = self.cache.write().await;
        let existing = cache
            .get(&pmode.id)
            .filter(|existing| {
                existing.initiator_identity() == pmode.initiator_identity()
                    && existing.responder_identity() == pmode.responder_identity()
            })
            .cloned();

        let Some(existing) = existing else {
            drop(cache);
            return self.create(pmode).await;
        };

        let event = if existing.metadata.deleted {
            "pmode_restored"
        } else {
            "pmode_updated"
        };
        let stored = self.replace(&mut cache, pmode, &existing).await?;
        tracing::info!(target: "msh::pmode", event = event, pmode = %stored.id);
        Ok(stored)
    }

    async fn persist(&self, pmode: &Arc<PMode>) -> Result<(), PModeStoreError> {
        let value = serde_json::to_value(&**pmode)?;
        self.backing.put(&pmode.id, value).await?;
        Ok(())
    }
}

/// Message partition channel registry.
#[derive(Debug)]
pub struct MpcStore {
    channels: RwLock<BTreeSet<String>>,
}

impl Default for MpcStore {
    fn default() -> Self {
        let mut channels = BTreeSet::new();
        channels.insert(DEFAULT_MPC.to_string());
        Self {
            channels: RwLock::new(channels),
        }
    }
}

impl MpcStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, mpc: impl Into<String>) {
        self.channels.write().await.insert(mpc.into());
    }

    pub async fn remove(&self, mpc: &str) -> bool {
        if mpc == DEFAULT_MPC {
            return false;
        }
        self.channels.write().await.remove(mpc)
    }

    pub async fn contains(&self, mpc: &str) -> bool {
        self.channels.read().await.contains(mpc)
    }

    pub fn is_default(mpc: &str) -> bool {
        mpc == DEFAULT_MPC
    }
}
