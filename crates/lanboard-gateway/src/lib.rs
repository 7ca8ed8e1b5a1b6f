//! The action gateway: the backend REST surface behind a trait, plus the
//! optimistic-apply/reconcile/rollback flow for operator actions.

pub mod api;
pub mod error;
pub mod gateway;
pub mod http;
pub mod mock;

pub use api::{CreateStation, SessionReceipt, StartSession, StationApi, SystemConfig};
pub use error::{ActionError, ApiError};
pub use gateway::{ActionGateway, Notification};
pub use http::HttpStationApi;
pub use mock::MockStationApi;
