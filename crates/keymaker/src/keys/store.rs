use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::codec::{DecodeError, DecodedKey, KeyCodec};

/// A key saved from the key maker, stored alongside its decoded payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRecord {
    pub id: String,
    pub value: String,
    pub decoded: DecodedKey,
    pub created_at: DateTime<Utc>,
}

/// Storage abstraction for saved keys.
pub trait KeyStore: Send + Sync {
    fn insert(&self, record: KeyRecord) -> Result<KeyRecord, KeyStoreError>;
    fn list(&self) -> Result<Vec<KeyRecord>, KeyStoreError>;
    fn fetch(&self, id: &str) -> Result<Option<KeyRecord>, KeyStoreError>;
    fn delete(&self, id: &str) -> Result<(), KeyStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("key '{0}' is already saved")]
    Duplicate(String),
    #[error("key record not found")]
    NotFound,
    #[error(transparent)]
    Invalid(#[from] DecodeError),
    #[error("key store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyStore {
    records: Arc<Mutex<Vec<KeyRecord>>>,
}

impl InMemoryKeyStore {
    fn records(&self) -> Result<std::sync::MutexGuard<'_, Vec<KeyRecord>>, KeyStoreError> {
        self.records
            .lock()
            .map_err(|_| KeyStoreError::Unavailable("key store lock poisoned".to_string()))
    }
}

impl KeyStore for InMemoryKeyStore {
    fn insert(&self, record: KeyRecord) -> Result<KeyRecord, KeyStoreError> {
        let mut records = self.records()?;
        if records.iter().any(|existing| existing.value == record.value) {
            return Err(KeyStoreError::Duplicate(record.value));
        }
        records.push(record.clone());
        Ok(record)
    }

    fn list(&self) -> Result<Vec<KeyRecord>, KeyStoreError> {
        Ok(self.records()?.clone())
    }

    fn fetch(&self, id: &str) -> Result<Option<KeyRecord>, KeyStoreError> {
        Ok(self.records()?.iter().find(|record| record.id == id).cloned())
    }

    fn delete(&self, id: &str) -> Result<(), KeyStoreError> {
        let mut records = self.records()?;
        let before = records.len();
        records.retain(|record| record.id != id);
        if records.len() == before {
            return Err(KeyStoreError::NotFound);
        }
        Ok(())
    }
}

static KEY_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_key_id() -> String {
    let id = KEY_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("key-{id:06}")
}

/// Validates keys with the configured codec before they reach the store.
pub struct KeyRegistry<S> {
    codec: KeyCodec,
    store: Arc<S>,
}

impl<S> KeyRegistry<S>
where
    S: KeyStore + 'static,
{
    pub fn new(codec: KeyCodec, store: Arc<S>) -> Self {
        Self { codec, store }
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// Decode `value` under whichever grammar it matches and save it.
    pub fn create(&self, value: &str) -> Result<KeyRecord, KeyStoreError> {
        let value = value.trim();
        let decoded = self.codec.decode_any(value)?;
        let record = KeyRecord {
            id: next_key_id(),
            value: value.to_string(),
            decoded,
            created_at: Utc::now(),
        };
        let stored = self.store.insert(record)?;
        tracing::info!(key_id = %stored.id, grammar = ?stored.decoded.grammar(), "key saved");
        Ok(stored)
    }

    /// Encode the payload and save the resulting key.
    pub fn create_from(&self, decoded: &DecodedKey) -> Result<KeyRecord, KeyStoreError> {
        self.create(&decoded.encode())
    }

    pub fn list(&self) -> Result<Vec<KeyRecord>, KeyStoreError> {
        self.store.list()
    }

    pub fn get(&self, id: &str) -> Result<KeyRecord, KeyStoreError> {
        self.store.fetch(id)?.ok_or(KeyStoreError::NotFound)
    }

    pub fn delete(&self, id: &str) -> Result<(), KeyStoreError> {
        self.store.delete(id)
    }
}
