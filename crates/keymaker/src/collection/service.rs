use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::{
    ActionUpdate, Communication, CommunicationSettings, CommunicationSettingsUpdate,
    CommunicationStatus, ContactInfo, Customer, CustomerId, CustomerUpdate, Individual,
    IndividualId, IndividualStatus, NewCommunication, NewCustomer, NewIndividual,
    NewScheduledAction, ProgressUpdate, ScheduledAction, SettingsError, WebhookSettings,
    WebhookSettingsUpdate,
};
use super::executor::{deliver, MessageDispatcher};
use super::lifecycle::{self, Transition, TransitionError};
use super::messages::{self, MessageKind};
use super::repository::{CustomerRepository, RecordKind, RepositoryError};
use super::scheduler::{self, DueAction, ScheduleError};
use super::webhook::{self, SignatureError};
use crate::keys::individual_link;

/// Days quoted to the caller for the background check once collection completes.
const BACKGROUND_CHECK_TURNAROUND_DAYS: i64 = 3;

/// Customer and individual operations behind the HTTP surface.
pub struct CollectionService<R, D> {
    repository: Arc<R>,
    dispatcher: Arc<D>,
}

static CUSTOMER_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_customer_id(now: DateTime<Utc>) -> CustomerId {
    let seq = CUSTOMER_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    CustomerId(format!("cust-{}-{seq:04}", now.timestamp_millis()))
}

/// Result of sending an invitation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub link: String,
    pub status: IndividualStatus,
    pub communication: Communication,
}

/// Progress report posted by the collection flow.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub customer_id: Option<CustomerId>,
    pub individual_id: Option<IndividualId>,
    #[serde(default)]
    pub status: Option<IndividualStatus>,
    #[serde(default)]
    pub progress: ProgressUpdate,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub customer_id: Option<CustomerId>,
    pub individual_id: Option<IndividualId>,
    #[serde(default)]
    pub collection_data: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReceipt {
    pub individual: Individual,
    pub background_check_initiated: bool,
    pub estimated_completion_time: DateTime<Utc>,
}

impl<R, D> CollectionService<R, D>
where
    R: CustomerRepository + 'static,
    D: MessageDispatcher + 'static,
{
    pub fn new(repository: Arc<R>, dispatcher: Arc<D>) -> Self {
        Self {
            repository,
            dispatcher,
        }
    }

    pub fn list_customers(&self) -> Result<Vec<Customer>, CollectionServiceError> {
        Ok(self.repository.list()?)
    }

    pub fn get_customer(&self, id: &CustomerId) -> Result<Customer, CollectionServiceError> {
        self.repository
            .fetch(id)?
            .ok_or(RepositoryError::NotFound(RecordKind::Customer).into())
    }

    pub fn create_customer(
        &self,
        new: NewCustomer,
        now: DateTime<Utc>,
    ) -> Result<Customer, CollectionServiceError> {
        if new.name.trim().is_empty() {
            return Err(CollectionServiceError::MissingField("name"));
        }
        if new.link.trim().is_empty() {
            return Err(CollectionServiceError::MissingField("link"));
        }
        let customer = Customer {
            id: next_customer_id(now),
            name: new.name,
            link: new.link,
            endpoint: new.endpoint,
            individuals: Vec::new(),
            communication_settings: new.communication_settings.unwrap_or_default().validated()?,
            webhook_settings: new.webhook_settings.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        let stored = self.repository.insert(customer)?;
        tracing::info!(customer_id = %stored.id, "customer created");
        Ok(stored)
    }

    pub fn update_customer(
        &self,
        id: &CustomerId,
        update: CustomerUpdate,
    ) -> Result<Customer, CollectionServiceError> {
        self.repository.modify_customer::<_, CollectionServiceError, _>(id, |customer| {
            if let Some(name) = update.name {
                customer.name = name;
            }
            if let Some(link) = update.link {
                customer.link = link;
            }
            if let Some(endpoint) = update.endpoint {
                customer.endpoint = endpoint;
            }
            Ok(customer.clone())
        })
    }

    pub fn delete_customer(&self, id: &CustomerId) -> Result<(), CollectionServiceError> {
        self.repository.delete(id)?;
        tracing::info!(customer_id = %id, "customer deleted");
        Ok(())
    }

    pub fn add_individual(
        &self,
        customer_id: &CustomerId,
        new: NewIndividual,
        now: DateTime<Utc>,
    ) -> Result<Individual, CollectionServiceError> {
        if new.id.0.trim().is_empty() {
            return Err(CollectionServiceError::MissingField("id"));
        }
        self.repository.modify_customer::<_, CollectionServiceError, _>(customer_id, |customer| {
            if customer.individual(&new.id).is_some() {
                return Err(RepositoryError::Conflict(RecordKind::Individual).into());
            }
            let mut individual = Individual::new(new.id, new.contact_info, now);
            individual.metadata = new.metadata;
            customer.individuals.push(individual.clone());
            Ok(individual)
        })
    }

    pub fn remove_individual(
        &self,
        customer_id: &CustomerId,
        individual_id: &IndividualId,
    ) -> Result<(), CollectionServiceError> {
        self.repository.modify_customer::<_, CollectionServiceError, _>(customer_id, |customer| {
            let before = customer.individuals.len();
            customer
                .individuals
                .retain(|individual| &individual.id != individual_id);
            if customer.individuals.len() == before {
                return Err(RepositoryError::NotFound(RecordKind::Individual).into());
            }
            Ok(())
        })
    }

    /// Move an individual to `status`, queueing the follow-on action the new status calls for.
    pub fn update_status(
        &self,
        customer_id: &CustomerId,
        individual_id: &IndividualId,
        status: IndividualStatus,
        now: DateTime<Utc>,
    ) -> Result<Individual, CollectionServiceError> {
        self.repository.modify_individual::<_, CollectionServiceError, _>(
            customer_id,
            individual_id,
            None,
            |_, individual| {
                apply_status(individual, status, now)?;
                Ok(individual.clone())
            },
        )
    }

    pub fn update_contact(
        &self,
        customer_id: &CustomerId,
        individual_id: &IndividualId,
        contact: ContactInfo,
    ) -> Result<Individual, CollectionServiceError> {
        self.repository.modify_individual::<_, CollectionServiceError, _>(
            customer_id,
            individual_id,
            None,
            |_, individual| {
                individual.contact_info = contact;
                Ok(individual.clone())
            },
        )
    }

    pub fn add_communication(
        &self,
        customer_id: &CustomerId,
        individual_id: &IndividualId,
        new: NewCommunication,
        now: DateTime<Utc>,
    ) -> Result<Communication, CollectionServiceError> {
        self.repository.modify_individual::<_, CollectionServiceError, _>(
            customer_id,
            individual_id,
            None,
            |_, individual| {
                let communication = Communication {
                    channel: new.channel,
                    timestamp: now,
                    status: new.status,
                    message_id: new
                        .message_id
                        .filter(|id| !id.is_empty())
                        .unwrap_or_else(|| messages::next_message_id(now)),
                    message: new.message,
                    error_details: new.error_details,
                };
                individual.communications.push(communication.clone());
                Ok(communication)
            },
        )
    }

    /// Record a delivery receipt. Only the status of an existing communication changes.
    pub fn update_communication_status(
        &self,
        customer_id: &CustomerId,
        individual_id: &IndividualId,
        message_id: &str,
        status: CommunicationStatus,
    ) -> Result<Communication, CollectionServiceError> {
        self.repository.modify_individual::<_, CollectionServiceError, _>(
            customer_id,
            individual_id,
            None,
            |_, individual| {
                let communication = individual
                    .communications
                    .iter_mut()
                    .find(|communication| communication.message_id == message_id)
                    .ok_or(RepositoryError::NotFound(RecordKind::Communication))?;
                communication.status = status;
                Ok(communication.clone())
            },
        )
    }

    pub fn add_action(
        &self,
        customer_id: &CustomerId,
        individual_id: &IndividualId,
        new: NewScheduledAction,
    ) -> Result<ScheduledAction, CollectionServiceError> {
        self.repository.modify_individual::<_, CollectionServiceError, _>(
            customer_id,
            individual_id,
            None,
            |_, individual| {
                let action = ScheduledAction::new(new.action_type, new.scheduled_for);
                individual.scheduled_actions.push(action.clone());
                Ok(action)
            },
        )
    }

    /// Reschedule an action or mark it executed. Executed actions are never reopened.
    pub fn update_action(
        &self,
        customer_id: &CustomerId,
        individual_id: &IndividualId,
        index: usize,
        update: ActionUpdate,
        now: DateTime<Utc>,
    ) -> Result<ScheduledAction, CollectionServiceError> {
        self.repository.modify_individual::<_, CollectionServiceError, _>(
            customer_id,
            individual_id,
            None,
            |_, individual| {
                let action = individual
                    .scheduled_actions
                    .get_mut(index)
                    .ok_or(RepositoryError::NotFound(RecordKind::ScheduledAction))?;
                if action.executed && update.executed == Some(false) {
                    return Err(CollectionServiceError::ActionExecuted(index));
                }
                if let Some(scheduled_for) = update.scheduled_for {
                    if action.executed {
                        return Err(CollectionServiceError::ActionExecuted(index));
                    }
                    action.scheduled_for = scheduled_for;
                }
                if update.executed == Some(true) && !action.executed {
                    action.executed = true;
                    action.executed_at = Some(now);
                }
                Ok(action.clone())
            },
        )
    }

    pub fn update_communication_settings(
        &self,
        customer_id: &CustomerId,
        update: CommunicationSettingsUpdate,
    ) -> Result<CommunicationSettings, CollectionServiceError> {
        self.repository.modify_customer::<_, CollectionServiceError, _>(customer_id, |customer| {
            customer.communication_settings.apply(update)?;
            Ok(customer.communication_settings.clone())
        })
    }

    pub fn update_webhook_settings(
        &self,
        customer_id: &CustomerId,
        update: WebhookSettingsUpdate,
    ) -> Result<WebhookSettings, CollectionServiceError> {
        self.repository.modify_customer::<_, CollectionServiceError, _>(customer_id, |customer| {
            customer.webhook_settings.apply(update);
            Ok(customer.webhook_settings.clone())
        })
    }

    pub fn due_actions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<DueAction>, CollectionServiceError> {
        let customers = self.repository.list()?;
        Ok(scheduler::due_actions(&customers, now))
    }

    /// Send the collection link to an individual and mark them invited.
    ///
    /// Inviting a pending individual also queues the expiration warning. Individuals further
    /// along just get the link again; closed ones are rejected.
    pub fn invite(
        &self,
        customer_id: &CustomerId,
        individual_id: &IndividualId,
        contact: Option<ContactInfo>,
        now: DateTime<Utc>,
    ) -> Result<Invitation, CollectionServiceError> {
        let (individual, link, settings) = self
            .repository
            .modify_individual::<_, CollectionServiceError, _>(
                customer_id,
                individual_id,
                None,
                |customer, individual| {
                    if let Some(contact) = contact {
                        individual.contact_info = contact;
                    }
                    match individual.status {
                        IndividualStatus::Pending => {
                            individual.scheduled_actions.push(scheduler::expiration_warning(
                                &customer.communication_settings,
                                now,
                            )?);
                            individual.status = IndividualStatus::Invited;
                        }
                        status if status.is_terminal() => {
                            return Err(TransitionError {
                                from: status,
                                to: IndividualStatus::Invited,
                            }
                            .into());
                        }
                        _ => {}
                    }
                    Ok((
                        individual.clone(),
                        customer.link.clone(),
                        customer.communication_settings.clone(),
                    ))
                },
            )?;

        // The store lock is released while the dispatcher runs.
        let communication = deliver(
            self.dispatcher.as_ref(),
            customer_id,
            &link,
            &settings,
            &individual,
            MessageKind::Invitation,
            now,
        );

        let status = self
            .repository
            .modify_individual::<_, CollectionServiceError, _>(
                customer_id,
                individual_id,
                None,
                |_, individual| {
                    individual.communications.push(communication.clone());
                    Ok(individual.status)
                },
            )?;
        let invitation = Invitation {
            link: individual_link(&link, &individual.id.0),
            status,
            communication,
        };
        tracing::info!(
            customer_id = %customer_id,
            individual_id = %individual_id,
            message_status = ?invitation.communication.status,
            "invitation sent"
        );
        Ok(invitation)
    }

    /// Verify an inbound webhook body against the customer's secret.
    ///
    /// Customers without a secret accept unsigned calls. Once a secret is configured, the
    /// signature header is mandatory.
    pub fn verify_webhook(
        &self,
        customer_id: &CustomerId,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<(), CollectionServiceError> {
        let customer = self.get_customer(customer_id)?;
        match (customer.webhook_settings.secret.as_deref(), signature) {
            (None, _) | (Some(""), _) => Ok(()),
            (Some(_), None) => Err(SignatureError::Malformed.into()),
            (Some(secret), Some(header)) => Ok(webhook::verify(secret, header, body)?),
        }
    }

    /// Apply a progress report: status change (through the lifecycle) and progress merge.
    pub fn record_progress(
        &self,
        report: ProgressReport,
        now: DateTime<Utc>,
    ) -> Result<Individual, CollectionServiceError> {
        let customer_id = report
            .customer_id
            .ok_or(CollectionServiceError::MissingField("customerId"))?;
        let individual_id = report
            .individual_id
            .ok_or(CollectionServiceError::MissingField("individualId"))?;

        let individual = self.repository.modify_individual::<_, CollectionServiceError, _>(
            &customer_id,
            &individual_id,
            None,
            |_, individual| {
                if let Some(status) = report.status {
                    apply_status(individual, status, now)?;
                    if status == IndividualStatus::Started
                        && individual.collection_progress.started_at.is_none()
                    {
                        individual.collection_progress.started_at = Some(now);
                    }
                }
                individual.collection_progress.merge(report.progress, now);
                Ok(individual.clone())
            },
        )?;

        tracing::info!(
            customer_id = %customer_id,
            individual_id = %individual_id,
            status = %individual.status,
            "collection progress recorded"
        );
        Ok(individual)
    }

    pub fn complete_collection(
        &self,
        report: CompletionReport,
        now: DateTime<Utc>,
    ) -> Result<CompletionReceipt, CollectionServiceError> {
        let customer_id = report
            .customer_id
            .ok_or(CollectionServiceError::MissingField("customerId"))?;
        let individual_id = report
            .individual_id
            .ok_or(CollectionServiceError::MissingField("individualId"))?;

        let individual = self.repository.modify_individual::<_, CollectionServiceError, _>(
            &customer_id,
            &individual_id,
            None,
            |_, individual| {
                apply_status(individual, IndividualStatus::Completed, now)?;
                individual.collection_progress.completed_at = Some(now);
                individual.collection_progress.last_activity_at = Some(now);
                individual.collection_progress.percent_complete = Some(100.0);
                if !report.collection_data.is_null() {
                    individual
                        .metadata
                        .insert("collectionData".to_string(), report.collection_data);
                }
                Ok(individual.clone())
            },
        )?;

        tracing::info!(
            customer_id = %customer_id,
            individual_id = %individual_id,
            "collection completed"
        );
        Ok(CompletionReceipt {
            individual,
            background_check_initiated: true,
            estimated_completion_time: now + Duration::days(BACKGROUND_CHECK_TURNAROUND_DAYS),
        })
    }
}

/// Run `status` through the lifecycle and queue its follow-on action when it moved.
fn apply_status(
    individual: &mut Individual,
    status: IndividualStatus,
    now: DateTime<Utc>,
) -> Result<Transition, CollectionServiceError> {
    let transition = lifecycle::transition(individual.status, status)?;
    if let Transition::Moved { to, .. } = transition {
        if let Some(action) = scheduler::on_status_change(to, now)? {
            individual.scheduled_actions.push(action);
        }
        individual.status = to;
    }
    Ok(transition)
}

/// Error raised by the collection service.
#[derive(Debug, thiserror::Error)]
pub enum CollectionServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("webhook signature rejected: {0}")]
    Signature(#[from] SignatureError),
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("scheduled action {0} has already executed")]
    ActionExecuted(usize),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}
