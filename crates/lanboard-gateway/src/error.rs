use lanboard_core::errors::CommandSendError;
use lanboard_core::ids::StationId;
use lanboard_engine::StoreError;

/// Typed errors from the backend REST surface.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ApiError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// Classify an HTTP status code into the appropriate error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            404 => Self::NotFound(body),
            400 | 409 | 422 => Self::InvalidRequest(body),
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Errors surfaced to the caller of an [`crate::ActionGateway`] action.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// Precondition failure, raised before any network call.
    #[error("no active session on station {0}")]
    NoActiveSession(StationId),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Backend rejected the action; the optimistic mutation was rolled back.
    #[error("{action} failed: {source}")]
    Backend {
        action: &'static str,
        source: ApiError,
    },

    /// The event channel is down, for actions carried over the socket.
    #[error(transparent)]
    Send(#[from] CommandSendError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_status_mapping() {
        assert!(matches!(
            ApiError::from_status(401, "no".into()),
            ApiError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            ApiError::from_status(404, "gone".into()),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from_status(409, "busy".into()),
            ApiError::InvalidRequest(_)
        ));
        assert!(matches!(
            ApiError::from_status(503, "down".into()),
            ApiError::ServerError { status: 503, .. }
        ));
    }
}
