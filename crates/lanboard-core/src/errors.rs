use crate::ids::SessionId;
use crate::station::StationStatus;

/// Rejected state transition. Raised before any mutation happens, so a
/// failed transition always leaves the station untouched.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum TransitionError {
    #[error("station is occupied")]
    Occupied,

    #[error("station is locked{}", .locked_for.as_deref().map(|n| format!(" for {n}")).unwrap_or_default())]
    Locked { locked_for: Option<String> },

    #[error("station is {status}, not available")]
    NotAvailable { status: StationStatus },

    #[error("session {expected} is not the live session ({actual:?})")]
    SessionMismatch {
        expected: SessionId,
        actual: Option<SessionId>,
    },

    #[error("no active session")]
    NoActiveSession,
}

/// Failure to queue an outbound command on the event channel.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CommandSendError {
    #[error("not connected")]
    NotConnected,

    #[error("outbound queue full")]
    QueueFull,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_error_names_assignee() {
        let err = TransitionError::Locked {
            locked_for: Some("ada".into()),
        };
        assert_eq!(err.to_string(), "station is locked for ada");

        let anon = TransitionError::Locked { locked_for: None };
        assert_eq!(anon.to_string(), "station is locked");
    }

    #[test]
    fn not_available_names_status() {
        let err = TransitionError::NotAvailable {
            status: StationStatus::Maintenance,
        };
        assert_eq!(err.to_string(), "station is MAINTENANCE, not available");
    }
}
