use keymaker::collection::{
    CollectionService, Customer, CustomerId, CustomerRepository, DispatchError, Individual,
    IndividualId, InMemoryCustomerRepository, MessageDispatcher, OutboundMessage,
    RepositoryError,
};
use keymaker::config::{AppConfig, StorageMode};
use keymaker::keys::{InMemoryKeyStore, KeyCodec, KeyRegistry};
use metrics_exporter_prometheus::PrometheusHandle;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Customer store used by the binary. Always serves from memory; when a snapshot path is
/// set, every successful write rewrites the JSON snapshot before returning.
pub(crate) struct CustomerStore {
    memory: InMemoryCustomerRepository,
    snapshot: Option<PathBuf>,
    writes: Mutex<()>,
}

impl CustomerStore {
    pub(crate) fn in_memory() -> Self {
        Self {
            memory: InMemoryCustomerRepository::default(),
            snapshot: None,
            writes: Mutex::new(()),
        }
    }

    /// Load the snapshot at `path`, starting empty when the file does not exist yet.
    pub(crate) fn open(path: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let path = path.into();
        let customers = if path.exists() {
            let raw = fs::read(&path).map_err(|err| unavailable(&path, err))?;
            serde_json::from_slice::<Vec<Customer>>(&raw).map_err(|err| unavailable(&path, err))?
        } else {
            Vec::new()
        };
        tracing::info!(
            path = %path.display(),
            customers = customers.len(),
            "customer snapshot loaded"
        );
        Ok(Self {
            memory: InMemoryCustomerRepository::from_customers(customers),
            snapshot: Some(path),
            writes: Mutex::new(()),
        })
    }

    pub(crate) fn from_config(config: &AppConfig) -> Result<Self, RepositoryError> {
        match config.storage.mode {
            StorageMode::Memory => Ok(Self::in_memory()),
            StorageMode::File => Self::open(&config.storage.path),
        }
    }

    fn persist(&self) -> Result<(), RepositoryError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let customers = self.memory.snapshot()?;
        let body = serde_json::to_vec_pretty(&customers).map_err(|err| unavailable(path, err))?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, body).map_err(|err| unavailable(&staging, err))?;
        fs::rename(&staging, path).map_err(|err| unavailable(path, err))
    }

    /// Run a write and persist it while holding the write lock, so snapshots land in
    /// the same order as the writes they capture. A write that cannot be persisted is
    /// undone in memory.
    fn write<T, E>(
        &self,
        op: impl FnOnce(&InMemoryCustomerRepository) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<RepositoryError>,
    {
        let _guard = self
            .writes
            .lock()
            .map_err(|_| RepositoryError::Unavailable("snapshot lock poisoned".to_string()))?;
        if self.snapshot.is_none() {
            return op(&self.memory);
        }
        let before = self.memory.snapshot()?;
        let output = op(&self.memory)?;
        if let Err(err) = self.persist() {
            tracing::error!(error = %err, "customer snapshot not written, rolling back");
            self.memory.restore(before)?;
            return Err(err.into());
        }
        Ok(output)
    }
}

fn unavailable(path: &Path, err: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Unavailable(format!("{}: {err}", path.display()))
}

impl CustomerRepository for CustomerStore {
    fn insert(&self, customer: Customer) -> Result<Customer, RepositoryError> {
        self.write(|memory| memory.insert(customer))
    }

    fn list(&self) -> Result<Vec<Customer>, RepositoryError> {
        self.memory.list()
    }

    fn fetch(&self, id: &CustomerId) -> Result<Option<Customer>, RepositoryError> {
        self.memory.fetch(id)
    }

    fn delete(&self, id: &CustomerId) -> Result<(), RepositoryError> {
        self.write(|memory| memory.delete(id))
    }

    fn modify_customer<T, E, F>(&self, id: &CustomerId, mutation: F) -> Result<T, E>
    where
        F: FnOnce(&mut Customer) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        self.write(|memory| memory.modify_customer(id, mutation))
    }

    fn modify_individual<T, E, F>(
        &self,
        customer_id: &CustomerId,
        individual_id: &IndividualId,
        expected_version: Option<u64>,
        mutation: F,
    ) -> Result<T, E>
    where
        F: FnOnce(&Customer, &mut Individual) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        self.write(|memory| {
            memory.modify_individual(customer_id, individual_id, expected_version, mutation)
        })
    }
}

/// Development dispatcher: records the send in the log instead of contacting a gateway.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct LoggingDispatcher;

impl MessageDispatcher for LoggingDispatcher {
    fn dispatch(&self, message: &OutboundMessage) -> Result<(), DispatchError> {
        let recipient = message
            .recipient()
            .ok_or(DispatchError::MissingRecipient(message.channel))?;
        tracing::info!(
            customer_id = %message.customer_id,
            individual_id = %message.individual_id,
            message_id = %message.message_id,
            kind = ?message.kind,
            channel = ?message.channel,
            recipient,
            "message dispatched"
        );
        Ok(())
    }
}

pub(crate) type Collection = CollectionService<CustomerStore, LoggingDispatcher>;

/// Shared handles built once from configuration and reused by `serve` and `sweep`.
pub(crate) struct Backend {
    pub(crate) customers: Arc<CustomerStore>,
    pub(crate) dispatcher: Arc<LoggingDispatcher>,
    pub(crate) keys: Arc<KeyRegistry<InMemoryKeyStore>>,
}

impl Backend {
    pub(crate) fn from_config(config: &AppConfig) -> Result<Self, RepositoryError> {
        Ok(Self::new(
            CustomerStore::from_config(config)?,
            KeyCodec::new(config.keys.language_policy),
        ))
    }

    pub(crate) fn new(customers: CustomerStore, codec: KeyCodec) -> Self {
        Self {
            customers: Arc::new(customers),
            dispatcher: Arc::new(LoggingDispatcher),
            keys: Arc::new(KeyRegistry::new(
                codec,
                Arc::new(InMemoryKeyStore::default()),
            )),
        }
    }

    pub(crate) fn collection(&self) -> Arc<Collection> {
        Arc::new(CollectionService::new(
            Arc::clone(&self.customers),
            Arc::clone(&self.dispatcher),
        ))
    }
}
