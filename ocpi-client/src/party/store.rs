//! Persistence seam for trust records
//!
//! The client only proposes records; where they live is up to the store.
//! Two stores ship with the crate:
//! - `InMemoryPartyStore` for tests and short-lived processes
//! - `JsonFilePartyStore`, a single JSON file rewritten atomically on each change

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use super::record::{PartyKey, RemoteParty};

/// Errors from a trust record store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Storage for remote party records, keyed by country code and party id
#[async_trait]
pub trait PartyStore: Send + Sync {
    async fn get(&self, key: &PartyKey) -> Result<Option<RemoteParty>, StoreError>;

    /// Insert or replace the record with the same key
    async fn upsert(&self, party: RemoteParty) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<RemoteParty>, StoreError>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct InMemoryPartyStore {
    parties: RwLock<HashMap<PartyKey, RemoteParty>>,
}

impl InMemoryPartyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PartyStore for InMemoryPartyStore {
    async fn get(&self, key: &PartyKey) -> Result<Option<RemoteParty>, StoreError> {
        Ok(self.parties.read().get(key).cloned())
    }

    async fn upsert(&self, party: RemoteParty) -> Result<(), StoreError> {
        self.parties.write().insert(party.key(), party);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RemoteParty>, StoreError> {
        let mut parties: Vec<RemoteParty> = self.parties.read().values().cloned().collect();
        parties.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(parties)
    }
}

/// Store backed by one JSON file holding an array of records
#[derive(Debug)]
pub struct JsonFilePartyStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFilePartyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<RemoteParty>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, parties: &[RemoteParty]) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }

        let bytes = serde_json::to_vec_pretty(parties)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!("Saved {} party records to {}", parties.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl PartyStore for JsonFilePartyStore {
    async fn get(&self, key: &PartyKey) -> Result<Option<RemoteParty>, StoreError> {
        Ok(self.load().await?.into_iter().find(|p| &p.key() == key))
    }

    async fn upsert(&self, party: RemoteParty) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut parties = self.load().await?;
        let key = party.key();
        match parties.iter_mut().find(|p| p.key() == key) {
            Some(existing) => *existing = party,
            None => parties.push(party),
        }

        self.save(&parties).await
    }

    async fn list(&self) -> Result<Vec<RemoteParty>, StoreError> {
        self.load().await
    }
}
