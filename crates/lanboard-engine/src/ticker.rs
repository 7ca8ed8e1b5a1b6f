//! The countdown driver: one pass over the store per period.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::store::StationStore;

/// Production countdown period: one pass per wall-clock minute.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(60);

/// Start the countdown task. The period is injectable so tests can run it
/// at millisecond speed; correctness does not depend on it because every
/// pass recomputes remaining time from the wall clock.
pub fn start_countdown(
    store: Arc<StationStore>,
    period: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await; // consume the immediate first tick
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => store.tick_all(Utc::now()),
            }
        }
    })
}
