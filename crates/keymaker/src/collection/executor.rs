use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task;

use super::domain::{
    ActionType, Channel, Communication, CommunicationSettings, CommunicationStatus, ContactInfo,
    CustomerId, Individual, IndividualId, IndividualStatus,
};
use super::lifecycle::{self, Transition};
use super::messages::{self, MessageKind};
use super::repository::{CustomerRepository, RecordKind, RepositoryError};
use super::scheduler::{self, ActionPlan, DueAction, ScheduleError};
use crate::keys::individual_link;

/// A composed message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub customer_id: CustomerId,
    pub individual_id: IndividualId,
    pub kind: MessageKind,
    pub channel: Channel,
    pub contact: ContactInfo,
    pub message_id: String,
    pub body: String,
}

impl OutboundMessage {
    /// Address for the message's channel. `Other` falls back to whichever address exists.
    pub fn recipient(&self) -> Option<&str> {
        match self.channel {
            Channel::Email => self.contact.email.as_deref(),
            Channel::Sms => self.contact.phone.as_deref(),
            Channel::Other => self
                .contact
                .email
                .as_deref()
                .or(self.contact.phone.as_deref()),
        }
    }
}

/// Outbound delivery seam (email gateway, SMS provider, or a log in development).
pub trait MessageDispatcher: Send + Sync {
    fn dispatch(&self, message: &OutboundMessage) -> Result<(), DispatchError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("no {0:?} address on file")]
    MissingRecipient(Channel),
    #[error("message transport unavailable: {0}")]
    Transport(String),
}

/// Compose, dispatch and record one message. Delivery failures are recorded on the
/// communication rather than returned.
pub(crate) fn deliver<D>(
    dispatcher: &D,
    customer_id: &CustomerId,
    customer_link: &str,
    settings: &CommunicationSettings,
    individual: &Individual,
    kind: MessageKind,
    now: DateTime<Utc>,
) -> Communication
where
    D: MessageDispatcher + ?Sized,
{
    let channel = individual.contact_info.preferred_channel;
    let link = individual_link(customer_link, &individual.id.0);
    let message = OutboundMessage {
        customer_id: customer_id.clone(),
        individual_id: individual.id.clone(),
        kind,
        channel,
        contact: individual.contact_info.clone(),
        message_id: messages::next_message_id(now),
        body: messages::compose_for(settings, kind, channel, &link),
    };

    let (status, error_details) = match dispatcher.dispatch(&message) {
        Ok(()) => (CommunicationStatus::Sent, None),
        Err(error) => {
            tracing::warn!(
                customer_id = %customer_id,
                individual_id = %individual.id,
                message_id = %message.message_id,
                error = %error,
                "message dispatch failed"
            );
            (CommunicationStatus::Failed, Some(error.to_string()))
        }
    };

    Communication {
        channel,
        timestamp: now,
        status,
        message_id: message.message_id,
        message: message.body,
        error_details,
    }
}

/// What happened to one due action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Executed {
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message_status: Option<CommunicationStatus>,
        #[serde(skip_serializing_if = "Option::is_none")]
        next_scheduled_for: Option<DateTime<Utc>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<IndividualStatus>,
    },
    /// Another sweep claimed the action first.
    AlreadyExecuted,
    /// Claimed, but the individual had already reached a terminal status.
    Closed { status: IndividualStatus },
    Unrecognized { action_type: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepItem {
    pub customer_id: CustomerId,
    pub individual_id: IndividualId,
    pub action_index: usize,
    pub action_type: ActionType,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepFailure {
    pub customer_id: CustomerId,
    pub individual_id: IndividualId,
    pub action_index: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub due: usize,
    pub items: Vec<SweepItem>,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn executed(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item.outcome, ItemOutcome::Executed { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.items.len() - self.executed()
    }
}

/// Per-item failure.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("scheduled action changed before it could be claimed")]
    ActionMoved,
    #[error("handler did not finish within {0:?}")]
    Timeout(Duration),
    #[error("handler task failed: {0}")]
    Join(String),
}

/// Failure of the sweep as a whole, before any item ran.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("sweep task failed: {0}")]
    Join(String),
}

enum Claim {
    Claimed {
        individual: Individual,
        settings: CommunicationSettings,
        link: String,
        plan: Option<ActionPlan>,
    },
    AlreadyExecuted,
}

/// Walks due actions and fires them one at a time.
pub struct ActionExecutor<R, D> {
    repository: Arc<R>,
    dispatcher: Arc<D>,
    item_timeout: Duration,
}

impl<R, D> Clone for ActionExecutor<R, D> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            dispatcher: Arc::clone(&self.dispatcher),
            item_timeout: self.item_timeout,
        }
    }
}

impl<R, D> ActionExecutor<R, D>
where
    R: CustomerRepository + 'static,
    D: MessageDispatcher + 'static,
{
    pub fn new(repository: Arc<R>, dispatcher: Arc<D>, item_timeout: Duration) -> Self {
        Self {
            repository,
            dispatcher,
            item_timeout,
        }
    }

    /// Run one sweep at `now`. Items run sequentially on the blocking pool, each under the
    /// configured timeout; a failing item is recorded and the sweep moves on.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, SweepError> {
        let repository = Arc::clone(&self.repository);
        let customers = task::spawn_blocking(move || repository.list())
            .await
            .map_err(|err| SweepError::Join(err.to_string()))??;

        let due = scheduler::due_actions(&customers, now);
        let mut report = SweepReport {
            due: due.len(),
            ..SweepReport::default()
        };
        tracing::info!(due = report.due, "starting scheduled action sweep");

        for item in due {
            let executor = self.clone();
            let job = item.clone();
            let handle = task::spawn_blocking(move || executor.execute(&job, now));
            let result = match tokio::time::timeout(self.item_timeout, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(join)) => Err(ExecutionError::Join(join.to_string())),
                Err(_) => Err(ExecutionError::Timeout(self.item_timeout)),
            };

            match result {
                Ok(outcome) => {
                    tracing::info!(
                        customer_id = %item.customer_id,
                        individual_id = %item.individual_id,
                        action_index = item.action_index,
                        action_type = %item.action.action_type,
                        outcome = ?outcome,
                        "scheduled action handled"
                    );
                    report.items.push(SweepItem {
                        customer_id: item.customer_id,
                        individual_id: item.individual_id,
                        action_index: item.action_index,
                        action_type: item.action.action_type,
                        outcome,
                    });
                }
                Err(error) => {
                    tracing::error!(
                        customer_id = %item.customer_id,
                        individual_id = %item.individual_id,
                        action_index = item.action_index,
                        error = %error,
                        "scheduled action failed"
                    );
                    report.failures.push(SweepFailure {
                        customer_id: item.customer_id,
                        individual_id: item.individual_id,
                        action_index: item.action_index,
                        error: error.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            due = report.due,
            executed = report.executed(),
            skipped = report.skipped(),
            failed = report.failures.len(),
            "scheduled action sweep finished"
        );
        Ok(report)
    }

    /// Claim and fire a single due action.
    pub fn execute(
        &self,
        item: &DueAction,
        now: DateTime<Utc>,
    ) -> Result<ItemOutcome, ExecutionError> {
        let claim = self.repository.modify_individual::<_, ExecutionError, _>(
            &item.customer_id,
            &item.individual_id,
            None,
            |customer, individual| {
                let action = individual
                    .scheduled_actions
                    .get_mut(item.action_index)
                    .ok_or(RepositoryError::NotFound(RecordKind::ScheduledAction))?;
                if action.action_type != item.action.action_type {
                    return Err(ExecutionError::ActionMoved);
                }
                if action.executed {
                    return Ok(Claim::AlreadyExecuted);
                }
                action.executed = true;
                action.executed_at = Some(now);
                let settings = customer.communication_settings.clone();
                // Planned before the claim commits: an unschedulable follow-on leaves the
                // action pending.
                let plan = scheduler::plan(&item.action.action_type, individual, &settings, now)?;
                Ok(Claim::Claimed {
                    individual: individual.clone(),
                    settings,
                    link: customer.link.clone(),
                    plan,
                })
            },
        )?;

        let (individual, settings, link, plan) = match claim {
            Claim::AlreadyExecuted => return Ok(ItemOutcome::AlreadyExecuted),
            Claim::Claimed {
                individual,
                settings,
                link,
                plan,
            } => (individual, settings, link, plan),
        };

        let action_type = &item.action.action_type;
        let Some(plan) = plan else {
            tracing::warn!(
                customer_id = %item.customer_id,
                individual_id = %item.individual_id,
                action_type = %action_type,
                "skipping unrecognized scheduled action"
            );
            return Ok(ItemOutcome::Unrecognized {
                action_type: action_type.name().to_string(),
            });
        };

        if individual.status.is_terminal() {
            return Ok(ItemOutcome::Closed {
                status: individual.status,
            });
        }

        let communication = plan.message.map(|kind| {
            deliver(
                self.dispatcher.as_ref(),
                &item.customer_id,
                &link,
                &settings,
                &individual,
                kind,
                now,
            )
        });
        let message_id = communication.as_ref().map(|c| c.message_id.clone());
        let message_status = communication.as_ref().map(|c| c.status);
        let next_scheduled_for = plan.next.as_ref().map(|next| next.scheduled_for);

        let status = self.repository.modify_individual::<_, ExecutionError, _>(
            &item.customer_id,
            &item.individual_id,
            None,
            |_, individual| {
                if let Some(communication) = communication {
                    individual.communications.push(communication);
                }
                if let Some(next) = plan.next {
                    individual.scheduled_actions.push(next);
                }
                let Some(target) = plan.status else {
                    return Ok(None);
                };
                match lifecycle::transition(individual.status, target) {
                    Ok(Transition::Moved { to, .. }) => {
                        individual.status = to;
                        Ok(Some(to))
                    }
                    Ok(Transition::Unchanged) => Ok(None),
                    Err(error) => {
                        tracing::warn!(
                            individual_id = %individual.id,
                            error = %error,
                            "status left unchanged"
                        );
                        Ok(None)
                    }
                }
            },
        )?;

        Ok(ItemOutcome::Executed {
            message_id,
            message_status,
            next_scheduled_for,
            status,
        })
    }
}
