//! Pure scheduling decisions: which actions are due and what firing one leads to.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::domain::{
    ActionType, Communication, CommunicationSettings, Customer, CustomerId, Individual,
    IndividualId, IndividualStatus, ScheduledAction,
};
use super::messages::{self, MessageKind};

/// An unexecuted action whose time has come, addressed by its position in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueAction {
    pub customer_id: CustomerId,
    pub individual_id: IndividualId,
    pub action_index: usize,
    pub action: ScheduledAction,
}

/// Every due action, in storage order.
pub fn due_actions(customers: &[Customer], now: DateTime<Utc>) -> Vec<DueAction> {
    customers
        .iter()
        .flat_map(|customer| {
            customer.individuals.iter().flat_map(move |individual| {
                individual
                    .scheduled_actions
                    .iter()
                    .enumerate()
                    .filter(move |(_, action)| action.is_due(now))
                    .map(move |(action_index, action)| DueAction {
                        customer_id: customer.id.clone(),
                        individual_id: individual.id.clone(),
                        action_index,
                        action: action.clone(),
                    })
            })
        })
        .collect()
}

/// A follow-on action whose due time falls outside the representable calendar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot schedule {action_type} {offset} after {from}")]
pub struct ScheduleError {
    pub action_type: ActionType,
    pub from: DateTime<Utc>,
    pub offset: Duration,
}

fn schedule(
    action_type: ActionType,
    from: DateTime<Utc>,
    offset: Duration,
) -> Result<ScheduledAction, ScheduleError> {
    match from.checked_add_signed(offset) {
        Some(at) => Ok(ScheduledAction::new(action_type, at)),
        None => Err(ScheduleError {
            action_type,
            from,
            offset,
        }),
    }
}

/// Action queued when an individual enters `status`.
pub fn on_status_change(
    status: IndividualStatus,
    now: DateTime<Utc>,
) -> Result<Option<ScheduledAction>, ScheduleError> {
    let (action_type, offset) = match status {
        IndividualStatus::Started => (ActionType::FollowUp, Duration::hours(24)),
        IndividualStatus::InProgress => (ActionType::Reminder, Duration::hours(48)),
        _ => return Ok(None),
    };
    schedule(action_type, now, offset).map(Some)
}

/// Expiration warning queued at invitation time, one day before the link lapses.
pub fn expiration_warning(
    settings: &CommunicationSettings,
    now: DateTime<Utc>,
) -> Result<ScheduledAction, ScheduleError> {
    let days = i64::from(settings.expiration_period.saturating_sub(1));
    schedule(ActionType::ExpirationNotice, now, Duration::days(days))
}

pub fn reminder_count(communications: &[Communication]) -> usize {
    communications
        .iter()
        .filter(|communication| messages::is_reminder(&communication.message))
        .count()
}

/// What firing an action does to its individual.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionPlan {
    pub message: Option<MessageKind>,
    pub next: Option<ScheduledAction>,
    pub status: Option<IndividualStatus>,
}

/// Decide the effects of firing `action_type` for `individual` as it stood before firing.
/// Returns `Ok(None)` for action types this build does not handle.
pub fn plan(
    action_type: &ActionType,
    individual: &Individual,
    settings: &CommunicationSettings,
    now: DateTime<Utc>,
) -> Result<Option<ActionPlan>, ScheduleError> {
    let plan = match action_type {
        ActionType::Reminder => {
            let sent = reminder_count(&individual.communications);
            let next = if sent < settings.max_reminders as usize {
                let every = Duration::days(i64::from(settings.reminder_frequency));
                Some(schedule(ActionType::Reminder, now, every)?)
            } else {
                None
            };
            ActionPlan {
                message: Some(MessageKind::Reminder),
                next,
                status: None,
            }
        }
        ActionType::ExpirationNotice => ActionPlan {
            message: Some(MessageKind::ExpirationNotice),
            next: Some(schedule(ActionType::Expire, now, Duration::days(1))?),
            status: None,
        },
        ActionType::FollowUp => ActionPlan {
            message: Some(MessageKind::FollowUp),
            ..ActionPlan::default()
        },
        ActionType::Expire => ActionPlan {
            status: Some(IndividualStatus::Expired),
            ..ActionPlan::default()
        },
        ActionType::Unrecognized(_) => return Ok(None),
    };
    Ok(Some(plan))
}
