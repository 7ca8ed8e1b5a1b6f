//! The synchronization engine: pure session lifecycle transitions, the
//! canonical observable station store, and the countdown ticker.

pub mod error;
pub mod lifecycle;
pub mod store;
pub mod ticker;

pub use error::StoreError;
pub use store::{Confirmation, Intent, StationStore};
