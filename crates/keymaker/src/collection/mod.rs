//! Collection tracking: customers, the individuals they screen, the status lifecycle and
//! the scheduled-action sweep that sends reminders and expiration notices.

pub mod domain;
pub mod executor;
pub mod lifecycle;
pub mod memory;
pub mod messages;
pub mod repository;
pub mod router;
pub mod scheduler;
pub mod service;
pub mod webhook;

#[cfg(test)]
mod tests;

pub use domain::{
    ActionType, ActionUpdate, Channel, CollectionProgress, Communication, CommunicationSettings,
    CommunicationSettingsUpdate, CommunicationStatus, ContactInfo, Customer, CustomerId,
    CustomerUpdate, Individual, IndividualId, IndividualStatus, NewCommunication, NewCustomer,
    NewIndividual, NewScheduledAction, ProgressUpdate, ScheduledAction, SettingsError,
    WebhookSettings, WebhookSettingsUpdate,
};
pub use executor::{
    ActionExecutor, DispatchError, ExecutionError, ItemOutcome, MessageDispatcher,
    OutboundMessage, SweepError, SweepFailure, SweepItem, SweepReport,
};
pub use lifecycle::{Transition, TransitionError};
pub use memory::InMemoryCustomerRepository;
pub use messages::MessageKind;
pub use repository::{CustomerRepository, RecordKind, RepositoryError};
pub use router::collection_router;
pub use scheduler::{ActionPlan, DueAction, ScheduleError};
pub use service::{
    CollectionService, CollectionServiceError, CompletionReceipt, CompletionReport, Invitation,
    ProgressReport,
};
pub use webhook::{SignatureError, SIGNATURE_HEADER};
