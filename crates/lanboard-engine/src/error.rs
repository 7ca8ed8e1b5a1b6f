use lanboard_core::errors::TransitionError;
use lanboard_core::ids::StationId;

/// Errors from store operations.
#[derive(Clone, Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unknown station {0}")]
    UnknownStation(StationId),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}
