use super::domain::IndividualStatus;

/// Outcome of applying a status to an individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The individual already had this status.
    Unchanged,
    Moved {
        from: IndividualStatus,
        to: IndividualStatus,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot move individual from {from} to {to}")]
pub struct TransitionError {
    pub from: IndividualStatus,
    pub to: IndividualStatus,
}

impl IndividualStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            IndividualStatus::Completed | IndividualStatus::Expired | IndividualStatus::Failed
        )
    }

    /// Position along `pending -> invited -> started -> in_progress -> completed`.
    const fn rank(self) -> Option<u8> {
        match self {
            IndividualStatus::Pending => Some(0),
            IndividualStatus::Invited => Some(1),
            IndividualStatus::Started => Some(2),
            IndividualStatus::InProgress => Some(3),
            IndividualStatus::Completed => Some(4),
            IndividualStatus::Expired | IndividualStatus::Failed => None,
        }
    }
}

/// Check a requested status change.
///
/// The forward chain may skip steps, any open status may expire or fail, and terminal
/// statuses never move. Re-asserting the current status is accepted as [`Transition::Unchanged`].
pub fn transition(
    from: IndividualStatus,
    to: IndividualStatus,
) -> Result<Transition, TransitionError> {
    if from == to {
        return Ok(Transition::Unchanged);
    }
    if from.is_terminal() {
        return Err(TransitionError { from, to });
    }
    let allowed = match (from.rank(), to.rank()) {
        (_, None) => true,
        (Some(current), Some(next)) => next > current,
        (None, Some(_)) => false,
    };
    if allowed {
        Ok(Transition::Moved { from, to })
    } else {
        Err(TransitionError { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use IndividualStatus::*;

    #[test]
    fn forward_chain_and_skips_are_allowed() {
        for (from, to) in [
            (Pending, Invited),
            (Invited, Started),
            (Started, InProgress),
            (InProgress, Completed),
            (Invited, InProgress),
            (Pending, Completed),
        ] {
            assert_eq!(transition(from, to), Ok(Transition::Moved { from, to }));
        }
    }

    #[test]
    fn open_statuses_can_expire_or_fail() {
        for from in [Pending, Invited, Started, InProgress] {
            assert!(transition(from, Expired).is_ok());
            assert!(transition(from, Failed).is_ok());
        }
    }

    #[test]
    fn backwards_and_terminal_moves_are_rejected() {
        assert_eq!(
            transition(InProgress, Started),
            Err(TransitionError {
                from: InProgress,
                to: Started
            })
        );
        for from in [Completed, Expired, Failed] {
            for to in [Pending, Invited, InProgress, Completed, Expired, Failed] {
                if from != to {
                    assert!(transition(from, to).is_err(), "{from} -> {to}");
                }
            }
        }
    }

    #[test]
    fn reasserting_is_a_no_op() {
        assert_eq!(transition(Started, Started), Ok(Transition::Unchanged));
        assert_eq!(transition(Completed, Completed), Ok(Transition::Unchanged));
    }
}
