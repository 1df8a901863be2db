use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndividualId(pub String);

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for IndividualId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where an individual stands in the collection flow. Transitions are governed by
/// [`super::lifecycle`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndividualStatus {
    #[default]
    Pending,
    Invited,
    Started,
    InProgress,
    Completed,
    Expired,
    Failed,
}

impl IndividualStatus {
    pub const fn label(self) -> &'static str {
        match self {
            IndividualStatus::Pending => "pending",
            IndividualStatus::Invited => "invited",
            IndividualStatus::Started => "started",
            IndividualStatus::InProgress => "in_progress",
            IndividualStatus::Completed => "completed",
            IndividualStatus::Expired => "expired",
            IndividualStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for IndividualStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Email,
    Sms,
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub preferred_channel: Channel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunicationStatus {
    #[default]
    Sent,
    Delivered,
    Failed,
    Opened,
}

/// One message sent to an individual. The log is append-only; only `status` changes
/// afterwards, when a delivery receipt arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Communication {
    pub channel: Channel,
    pub timestamp: DateTime<Utc>,
    pub status: CommunicationStatus,
    pub message_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

/// Kind of scheduled work. Names this build does not know are kept verbatim so the
/// sweep can report and skip them instead of failing to load the record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    Reminder,
    ExpirationNotice,
    FollowUp,
    Expire,
    Unrecognized(String),
}

impl ActionType {
    pub fn name(&self) -> &str {
        match self {
            ActionType::Reminder => "reminder",
            ActionType::ExpirationNotice => "expiration_notice",
            ActionType::FollowUp => "follow_up",
            ActionType::Expire => "expire",
            ActionType::Unrecognized(name) => name,
        }
    }
}

impl From<String> for ActionType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "reminder" => ActionType::Reminder,
            "expiration_notice" => ActionType::ExpirationNotice,
            "follow_up" => ActionType::FollowUp,
            "expire" => ActionType::Expire,
            _ => ActionType::Unrecognized(value),
        }
    }
}

impl From<ActionType> for String {
    fn from(value: ActionType) -> Self {
        value.name().to_string()
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Work queued against an individual. Never removed; executed entries form the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub scheduled_for: DateTime<Utc>,
    #[serde(default)]
    pub executed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
}

impl ScheduledAction {
    pub fn new(action_type: ActionType, scheduled_for: DateTime<Utc>) -> Self {
        Self {
            action_type,
            scheduled_for,
            executed: false,
            executed_at: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.executed && self.scheduled_for <= now
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionProgress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(default)]
    pub completed_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_complete: Option<f64>,
}

/// Partial progress reported by the collection flow. Present fields overwrite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub completed_steps: Option<Vec<String>>,
    #[serde(default)]
    pub total_steps: Option<u32>,
    #[serde(default)]
    pub percent_complete: Option<f64>,
}

impl CollectionProgress {
    pub fn merge(&mut self, update: ProgressUpdate, now: DateTime<Utc>) {
        if let Some(started_at) = update.started_at {
            self.started_at = Some(started_at);
        }
        if let Some(step) = update.current_step {
            self.current_step = Some(step);
        }
        if let Some(steps) = update.completed_steps {
            self.completed_steps = steps;
        }
        if let Some(total) = update.total_steps {
            self.total_steps = Some(total);
        }
        if let Some(percent) = update.percent_complete {
            self.percent_complete = Some(percent.clamp(0.0, 100.0));
        }
        self.last_activity_at = Some(now);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Individual {
    pub id: IndividualId,
    #[serde(default)]
    pub status: IndividualStatus,
    #[serde(default)]
    pub contact_info: ContactInfo,
    #[serde(default)]
    pub communications: Vec<Communication>,
    #[serde(default)]
    pub collection_progress: CollectionProgress,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    #[serde(default)]
    pub scheduled_actions: Vec<ScheduledAction>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by the repository on every write.
    #[serde(default)]
    pub version: u64,
}

impl Individual {
    pub fn new(id: IndividualId, contact_info: ContactInfo, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: IndividualStatus::Pending,
            contact_info,
            communications: Vec::new(),
            collection_progress: CollectionProgress::default(),
            metadata: BTreeMap::new(),
            scheduled_actions: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sms_template: Option<String>,
    /// Days between reminders.
    #[serde(default = "default_reminder_frequency")]
    pub reminder_frequency: u32,
    #[serde(default = "default_max_reminders")]
    pub max_reminders: u32,
    /// Days a collection link stays valid.
    #[serde(default = "default_expiration_period")]
    pub expiration_period: u32,
}

fn default_reminder_frequency() -> u32 {
    7
}

fn default_max_reminders() -> u32 {
    3
}

fn default_expiration_period() -> u32 {
    30
}

impl Default for CommunicationSettings {
    fn default() -> Self {
        Self {
            email_template: None,
            sms_template: None,
            reminder_frequency: default_reminder_frequency(),
            max_reminders: default_max_reminders(),
            expiration_period: default_expiration_period(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    /// Base collection link; individual links are derived from it.
    pub link: String,
    pub endpoint: String,
    #[serde(default)]
    pub individuals: Vec<Individual>,
    #[serde(default)]
    pub communication_settings: CommunicationSettings,
    #[serde(default)]
    pub webhook_settings: WebhookSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    pub fn individual(&self, id: &IndividualId) -> Option<&Individual> {
        self.individuals.iter().find(|individual| &individual.id == id)
    }
}

/// Payload for creating a customer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCustomer {
    pub name: String,
    pub link: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub communication_settings: Option<CommunicationSettings>,
    #[serde(default)]
    pub webhook_settings: Option<WebhookSettings>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIndividual {
    pub id: IndividualId,
    #[serde(default)]
    pub contact_info: ContactInfo,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCommunication {
    pub channel: Channel,
    #[serde(default)]
    pub status: CommunicationStatus,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error_details: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewScheduledAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub scheduled_for: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionUpdate {
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default)]
    pub executed: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationSettingsUpdate {
    #[serde(default)]
    pub email_template: Option<String>,
    #[serde(default)]
    pub sms_template: Option<String>,
    #[serde(default)]
    pub reminder_frequency: Option<u32>,
    #[serde(default)]
    pub max_reminders: Option<u32>,
    #[serde(default)]
    pub expiration_period: Option<u32>,
}

pub const MAX_REMINDER_FREQUENCY_DAYS: u32 = 365;
pub const MAX_REMINDERS: u32 = 50;
pub const MAX_EXPIRATION_PERIOD_DAYS: u32 = 365;

/// A cadence setting outside the range the scheduler accepts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field} must be between {min} and {max}, got {value}")]
pub struct SettingsError {
    pub field: &'static str,
    pub value: u32,
    pub min: u32,
    pub max: u32,
}

fn within(field: &'static str, value: u32, min: u32, max: u32) -> Result<(), SettingsError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(SettingsError {
            field,
            value,
            min,
            max,
        })
    }
}

impl CommunicationSettings {
    /// Check cadence bounds. A zero reminder frequency means the weekly default.
    pub fn validated(mut self) -> Result<Self, SettingsError> {
        if self.reminder_frequency == 0 {
            self.reminder_frequency = default_reminder_frequency();
        }
        within(
            "reminderFrequency",
            self.reminder_frequency,
            1,
            MAX_REMINDER_FREQUENCY_DAYS,
        )?;
        within("maxReminders", self.max_reminders, 0, MAX_REMINDERS)?;
        within(
            "expirationPeriod",
            self.expiration_period,
            1,
            MAX_EXPIRATION_PERIOD_DAYS,
        )?;
        Ok(self)
    }

    /// Merge `update`; nothing changes when the result would be out of bounds.
    pub fn apply(&mut self, update: CommunicationSettingsUpdate) -> Result<(), SettingsError> {
        let mut next = self.clone();
        if let Some(template) = update.email_template {
            next.email_template = Some(template);
        }
        if let Some(template) = update.sms_template {
            next.sms_template = Some(template);
        }
        if let Some(days) = update.reminder_frequency {
            next.reminder_frequency = days;
        }
        if let Some(max) = update.max_reminders {
            next.max_reminders = max;
        }
        if let Some(days) = update.expiration_period {
            next.expiration_period = days;
        }
        *self = next.validated()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSettingsUpdate {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub events: Option<Vec<String>>,
}

impl WebhookSettings {
    pub fn apply(&mut self, update: WebhookSettingsUpdate) {
        if let Some(url) = update.url {
            self.url = Some(url);
        }
        if let Some(secret) = update.secret {
            self.secret = Some(secret);
        }
        if let Some(events) = update.events {
            self.events = events;
        }
    }
}
