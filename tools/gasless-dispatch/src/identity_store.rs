//! Persistent owner identity.
//!
//! The record holds the owner key plus the two addresses derived from it. Only the key is
//! authoritative: both addresses are recomputed on every load and a disagreement is reported
//! instead of silently trusting (or rewriting) the stored values.
//!
//! The smart-account address comes from an [`AccountResolver`]: a [`DeploymentConfig`] with a
//! proxy creation code derives it locally, the executor falls back to the factory's `getAddress`.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use gasless_intent_encoder::{derive_smart_account, generate_owner_key, owner_address};
use gasless_intent_types::DeploymentConfig;
use k256::ecdsa::SigningKey;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::PersistenceError;

/// Owner key and the accounts it controls. Immutable once built.
#[derive(Clone, Debug)]
pub struct Identity {
    pub signing_key: SigningKey,
    pub owner: Address,
    pub smart_account: Address,
}

/// On-disk shape of an identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub pk: B256,
    pub address: Address,
    #[serde(rename = "scwAddress")]
    pub scw_address: Address,
}

/// Maps an owner address to the smart account it controls.
#[async_trait]
pub trait AccountResolver: Send + Sync {
    async fn smart_account(&self, owner: Address) -> Result<Address, PersistenceError>;
}

#[async_trait]
impl AccountResolver for DeploymentConfig {
    async fn smart_account(&self, owner: Address) -> Result<Address, PersistenceError> {
        derive_smart_account(owner, self).ok_or_else(|| {
            PersistenceError::Underivable("no proxy creation code configured".to_string())
        })
    }
}

#[async_trait]
impl<R: AccountResolver + ?Sized> AccountResolver for &R {
    async fn smart_account(&self, owner: Address) -> Result<Address, PersistenceError> {
        (**self).smart_account(owner).await
    }
}

/// Backing store for a single identity record.
pub trait IdentityRecordStore {
    /// `Ok(None)` when no record has been written yet.
    fn read(&self) -> Result<Option<IdentityRecord>, PersistenceError>;
    fn write(&self, record: &IdentityRecord) -> Result<(), PersistenceError>;
}

/// JSON file store (`.cache.json` in the working directory by default).
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl IdentityRecordStore for JsonFileStore {
    fn read(&self) -> Result<Option<IdentityRecord>, PersistenceError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path).map_err(|source| PersistenceError::Unreadable {
            path: self.path.clone(),
            source,
        })?;
        // An empty file is what a crashed first run leaves behind; treat it as absent.
        if raw.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| PersistenceError::Corrupt(format!("{}: {e}", self.path.display())))
    }

    fn write(&self, record: &IdentityRecord) -> Result<(), PersistenceError> {
        let write_failed = |source| PersistenceError::WriteFailed {
            path: self.path.clone(),
            source,
        };

        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }

        let serialised = serde_json::to_string_pretty(record)
            .map_err(|e| PersistenceError::Corrupt(format!("failed serialising identity: {e}")))?;
        let tmp_path = tmp_path_for(&self.path);
        fs::write(&tmp_path, serialised.as_bytes()).map_err(write_failed)?;
        fs::rename(&tmp_path, &self.path).map_err(write_failed)?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// In-memory store; counts writes so callers can check bootstrap behaviour.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<Option<IdentityRecord>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn with_record(record: IdentityRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl IdentityRecordStore for MemoryStore {
    fn read(&self) -> Result<Option<IdentityRecord>, PersistenceError> {
        let guard = self
            .record
            .lock()
            .map_err(|_| PersistenceError::Corrupt("identity lock poisoned".to_string()))?;
        Ok(guard.clone())
    }

    fn write(&self, record: &IdentityRecord) -> Result<(), PersistenceError> {
        let mut guard = self
            .record
            .lock()
            .map_err(|_| PersistenceError::Corrupt("identity lock poisoned".to_string()))?;
        *guard = Some(record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Loads the persisted identity, creating and persisting a fresh one on first use.
pub struct IdentityStore<S, R> {
    store: S,
    resolver: R,
}

impl<S: IdentityRecordStore, R: AccountResolver> IdentityStore<S, R> {
    pub fn new(store: S, resolver: R) -> Self {
        Self { store, resolver }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn load_or_create(&self) -> Result<Identity, PersistenceError> {
        match self.store.read()? {
            Some(record) => {
                let identity = self.verify(&record).await?;
                debug!(
                    owner = %identity.owner,
                    smart_account = %identity.smart_account,
                    "loaded identity"
                );
                Ok(identity)
            }
            None => {
                let identity = self.identity_from_key(generate_owner_key()).await?;
                self.store.write(&IdentityRecord {
                    pk: B256::from_slice(&identity.signing_key.to_bytes()),
                    address: identity.owner,
                    scw_address: identity.smart_account,
                })?;
                info!(
                    owner = %identity.owner,
                    smart_account = %identity.smart_account,
                    "created identity"
                );
                Ok(identity)
            }
        }
    }

    async fn identity_from_key(
        &self,
        signing_key: SigningKey,
    ) -> Result<Identity, PersistenceError> {
        let owner = owner_address(&signing_key);
        let smart_account = self.resolver.smart_account(owner).await?;
        Ok(Identity {
            signing_key,
            owner,
            smart_account,
        })
    }

    async fn verify(&self, record: &IdentityRecord) -> Result<Identity, PersistenceError> {
        let key = SigningKey::from_slice(record.pk.as_slice()).map_err(|_| {
            PersistenceError::Corrupt("stored key is not a valid secp256k1 scalar".to_string())
        })?;
        let owner = owner_address(&key);
        if owner != record.address {
            return Err(PersistenceError::AddressMismatch {
                field: "owner address",
                stored: record.address,
                derived: owner,
            });
        }

        let identity = self.identity_from_key(key).await?;
        if identity.smart_account != record.scw_address {
            return Err(PersistenceError::AddressMismatch {
                field: "smart account address",
                stored: record.scw_address,
                derived: identity.smart_account,
            });
        }
        Ok(identity)
    }
}
