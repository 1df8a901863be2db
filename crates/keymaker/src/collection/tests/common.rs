use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::collection::domain::{
    ActionType, Channel, Communication, CommunicationStatus, ContactInfo, Customer, CustomerId,
    Individual, IndividualId, IndividualStatus, ScheduledAction,
};
use crate::collection::executor::{
    ActionExecutor, DispatchError, MessageDispatcher, OutboundMessage,
};
use crate::collection::memory::InMemoryCustomerRepository;
use crate::collection::messages::{compose, MessageKind};
use crate::collection::repository::{CustomerRepository, RepositoryError};
use crate::collection::service::CollectionService;

pub(super) const CUSTOMER_LINK: &str = "https://collect.example.com/collect?key=en-EPA-DTB-R5-E3-E-P-W";

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0)
        .single()
        .expect("valid time")
}

pub(super) fn customer_id() -> CustomerId {
    CustomerId("cust-acme".to_string())
}

pub(super) fn individual_id(id: &str) -> IndividualId {
    IndividualId(id.to_string())
}

pub(super) fn individual(id: &str, status: IndividualStatus) -> Individual {
    let mut individual = Individual::new(
        individual_id(id),
        ContactInfo {
            email: Some(format!("{id}@example.com")),
            phone: Some("+15550100".to_string()),
            preferred_channel: Channel::Email,
        },
        now() - chrono::Duration::days(10),
    );
    individual.status = status;
    individual
}

pub(super) fn with_action(
    mut individual: Individual,
    action_type: ActionType,
    scheduled_for: DateTime<Utc>,
) -> Individual {
    individual
        .scheduled_actions
        .push(ScheduledAction::new(action_type, scheduled_for));
    individual
}

pub(super) fn with_prior_reminders(mut individual: Individual, count: usize) -> Individual {
    for n in 0..count {
        individual.communications.push(Communication {
            channel: Channel::Email,
            timestamp: now() - chrono::Duration::days(30 - n as i64),
            status: CommunicationStatus::Delivered,
            message_id: format!("msg-prior-{n}"),
            message: compose(MessageKind::Reminder, Channel::Email, CUSTOMER_LINK),
            error_details: None,
        });
    }
    individual
}

pub(super) fn customer(individuals: Vec<Individual>) -> Customer {
    let created = now() - chrono::Duration::days(30);
    Customer {
        id: customer_id(),
        name: "Acme Staffing".to_string(),
        link: CUSTOMER_LINK.to_string(),
        endpoint: "acme".to_string(),
        individuals,
        communication_settings: Default::default(),
        webhook_settings: Default::default(),
        created_at: created,
        updated_at: created,
    }
}

pub(super) fn repository(individuals: Vec<Individual>) -> Arc<InMemoryCustomerRepository> {
    Arc::new(InMemoryCustomerRepository::from_customers(vec![customer(
        individuals,
    )]))
}

pub(super) fn stored_individual(repository: &InMemoryCustomerRepository, id: &str) -> Individual {
    repository
        .fetch(&customer_id())
        .expect("fetch customer")
        .expect("customer present")
        .individual(&individual_id(id))
        .cloned()
        .expect("individual present")
}

pub(super) fn executor<D: MessageDispatcher + 'static>(
    repository: Arc<InMemoryCustomerRepository>,
    dispatcher: Arc<D>,
) -> ActionExecutor<InMemoryCustomerRepository, D> {
    ActionExecutor::new(repository, dispatcher, Duration::from_secs(5))
}

pub(super) fn build_service(
    individuals: Vec<Individual>,
) -> (
    CollectionService<InMemoryCustomerRepository, RecordingDispatcher>,
    Arc<InMemoryCustomerRepository>,
    Arc<RecordingDispatcher>,
) {
    let repository = repository(individuals);
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let service = CollectionService::new(repository.clone(), dispatcher.clone());
    (service, repository, dispatcher)
}

#[derive(Default, Clone)]
pub(super) struct RecordingDispatcher {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl RecordingDispatcher {
    pub(super) fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().expect("dispatcher mutex poisoned").clone()
    }
}

impl MessageDispatcher for RecordingDispatcher {
    fn dispatch(&self, message: &OutboundMessage) -> Result<(), DispatchError> {
        self.sent
            .lock()
            .expect("dispatcher mutex poisoned")
            .push(message.clone());
        Ok(())
    }
}

/// Reads the store from another thread while dispatching, recording the individual's status
/// as seen there, or `None` when the store stayed locked.
pub(super) struct StoreObservingDispatcher {
    repository: Arc<InMemoryCustomerRepository>,
    observed: Mutex<Vec<Option<IndividualStatus>>>,
}

impl StoreObservingDispatcher {
    pub(super) fn new(repository: Arc<InMemoryCustomerRepository>) -> Self {
        Self {
            repository,
            observed: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn observed(&self) -> Vec<Option<IndividualStatus>> {
        self.observed.lock().expect("observer mutex poisoned").clone()
    }
}

impl MessageDispatcher for StoreObservingDispatcher {
    fn dispatch(&self, message: &OutboundMessage) -> Result<(), DispatchError> {
        let (tx, rx) = std::sync::mpsc::channel();
        let repository = Arc::clone(&self.repository);
        let (customer_id, individual_id) =
            (message.customer_id.clone(), message.individual_id.clone());
        std::thread::spawn(move || {
            let status = repository
                .fetch(&customer_id)
                .ok()
                .flatten()
                .and_then(|customer| customer.individual(&individual_id).map(|i| i.status));
            let _ = tx.send(status);
        });
        let seen = rx.recv_timeout(Duration::from_millis(500)).ok().flatten();
        self.observed
            .lock()
            .expect("observer mutex poisoned")
            .push(seen);
        Ok(())
    }
}

pub(super) struct FailingDispatcher;

impl MessageDispatcher for FailingDispatcher {
    fn dispatch(&self, _message: &OutboundMessage) -> Result<(), DispatchError> {
        Err(DispatchError::Transport("smtp relay refused connection".to_string()))
    }
}

/// Blocks for `delay` when dispatching to `individual`, delivers instantly otherwise.
pub(super) struct StallingDispatcher {
    pub(super) individual: IndividualId,
    pub(super) delay: Duration,
}

impl MessageDispatcher for StallingDispatcher {
    fn dispatch(&self, message: &OutboundMessage) -> Result<(), DispatchError> {
        if message.individual_id == self.individual {
            std::thread::sleep(self.delay);
        }
        Ok(())
    }
}

pub(super) struct UnavailableRepository;

impl CustomerRepository for UnavailableRepository {
    fn insert(&self, _customer: Customer) -> Result<Customer, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self) -> Result<Vec<Customer>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &CustomerId) -> Result<Option<Customer>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn delete(&self, _id: &CustomerId) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn modify_customer<T, E, F>(&self, _id: &CustomerId, _mutation: F) -> Result<T, E>
    where
        F: FnOnce(&mut Customer) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        Err(RepositoryError::Unavailable("database offline".to_string()).into())
    }

    fn modify_individual<T, E, F>(
        &self,
        _customer_id: &CustomerId,
        _individual_id: &IndividualId,
        _expected_version: Option<u64>,
        _mutation: F,
    ) -> Result<T, E>
    where
        F: FnOnce(&Customer, &mut Individual) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        Err(RepositoryError::Unavailable("database offline".to_string()).into())
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
