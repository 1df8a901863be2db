use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use super::domain::{Channel, CommunicationSettings};

/// Prefix shared by every reminder body. Prior reminders are counted by it.
pub const REMINDER_MARKER: &str = "Reminder:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Invitation,
    Reminder,
    ExpirationNotice,
    FollowUp,
}

/// Message body for `kind` on `channel`. Channels without their own wording reuse the
/// email text.
pub fn compose(kind: MessageKind, channel: Channel, link: &str) -> String {
    match (kind, channel) {
        (MessageKind::Invitation, Channel::Sms) => {
            format!("Background check required. Click to complete: {link}")
        }
        (MessageKind::Invitation, _) => {
            format!("Please complete your background check by clicking this link: {link}")
        }
        (MessageKind::Reminder, Channel::Sms) => {
            format!("{REMINDER_MARKER} Background check required. Click to complete: {link}")
        }
        (MessageKind::Reminder, _) => format!(
            "{REMINDER_MARKER} Please complete your background check by clicking this link: {link}"
        ),
        (MessageKind::ExpirationNotice, Channel::Sms) => {
            format!("Your background check link will expire soon. Click to complete: {link}")
        }
        (MessageKind::ExpirationNotice, _) => format!(
            "Your background check link will expire soon. Please complete it by clicking this link: {link}"
        ),
        (MessageKind::FollowUp, Channel::Sms) => {
            format!("Follow-up: Please complete your background check: {link}")
        }
        (MessageKind::FollowUp, _) => format!(
            "Follow-up: We noticed you started but didn't complete your background check. Please finish by clicking this link: {link}"
        ),
    }
}

/// Like [`compose`], but a customer's own template replaces the invitation wording for
/// its channel (`smsTemplate` for SMS, `emailTemplate` otherwise). `{link}` in the
/// template is substituted; a template without it gets the link appended. Other kinds
/// keep the built-in wording so reminders stay countable.
pub fn compose_for(
    settings: &CommunicationSettings,
    kind: MessageKind,
    channel: Channel,
    link: &str,
) -> String {
    let template = match channel {
        Channel::Sms => settings.sms_template.as_deref(),
        Channel::Email | Channel::Other => settings.email_template.as_deref(),
    };
    match template.map(str::trim) {
        Some(template) if kind == MessageKind::Invitation && !template.is_empty() => {
            if template.contains(LINK_PLACEHOLDER) {
                template.replace(LINK_PLACEHOLDER, link)
            } else {
                format!("{template} {link}")
            }
        }
        _ => compose(kind, channel, link),
    }
}

const LINK_PLACEHOLDER: &str = "{link}";

pub fn is_reminder(message: &str) -> bool {
    message.starts_with(REMINDER_MARKER)
}

static MESSAGE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_message_id(now: DateTime<Utc>) -> String {
    let seq = MESSAGE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("msg-{}-{seq:04}", now.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINK: &str = "https://collect.example.com?key=en-E-N-N-N-N-N-E&puid=ind-1";

    #[test]
    fn reminders_carry_the_marker_on_every_channel() {
        for channel in [Channel::Email, Channel::Sms, Channel::Other] {
            let body = compose(MessageKind::Reminder, channel, LINK);
            assert!(is_reminder(&body), "{body}");
            assert!(body.ends_with(LINK));
        }
    }

    #[test]
    fn other_messages_are_not_counted_as_reminders() {
        for kind in [
            MessageKind::Invitation,
            MessageKind::ExpirationNotice,
            MessageKind::FollowUp,
        ] {
            assert!(!is_reminder(&compose(kind, Channel::Email, LINK)));
        }
    }

    #[test]
    fn customer_templates_replace_the_invitation_only() {
        let settings = CommunicationSettings {
            email_template: Some("Hi! Start here: {link}".to_string()),
            sms_template: Some("Acme screening".to_string()),
            ..CommunicationSettings::default()
        };
        assert_eq!(
            compose_for(&settings, MessageKind::Invitation, Channel::Email, LINK),
            format!("Hi! Start here: {LINK}")
        );
        assert_eq!(
            compose_for(&settings, MessageKind::Invitation, Channel::Sms, LINK),
            format!("Acme screening {LINK}")
        );
        assert_eq!(
            compose_for(&settings, MessageKind::Reminder, Channel::Email, LINK),
            compose(MessageKind::Reminder, Channel::Email, LINK)
        );
        assert_eq!(
            compose_for(
                &CommunicationSettings::default(),
                MessageKind::Invitation,
                Channel::Other,
                LINK
            ),
            compose(MessageKind::Invitation, Channel::Email, LINK)
        );
    }

    #[test]
    fn sms_wording_is_shorter() {
        assert_eq!(
            compose(MessageKind::FollowUp, Channel::Sms, LINK),
            format!("Follow-up: Please complete your background check: {LINK}")
        );
        assert_eq!(
            compose(MessageKind::Invitation, Channel::Other, LINK),
            compose(MessageKind::Invitation, Channel::Email, LINK)
        );
    }
}
