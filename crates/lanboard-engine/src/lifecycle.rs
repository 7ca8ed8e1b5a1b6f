//! Pure state transitions for one station.
//!
//! Every function here takes the clock as a parameter and does no I/O, so
//! the same code path serves optimistic local intents, remote push events,
//! and tests. A rejected transition never mutates the station.

use chrono::{DateTime, Duration, Utc};

use lanboard_core::errors::TransitionError;
use lanboard_core::ids::SessionId;
use lanboard_core::station::{ActiveSession, SessionRecord, Station, StationStatus};

/// Result of an end-session transition.
#[derive(Clone, Debug)]
pub enum EndOutcome {
    /// The live session was finalized into this record.
    Ended(SessionRecord),
    /// The id was already in the history; nothing changed.
    AlreadyEnded,
}

/// Reserve a station for a customer. Valid only while not occupied.
pub fn lock(station: &mut Station, assignee: Option<String>) -> Result<(), TransitionError> {
    if station.status == StationStatus::Occupied {
        return Err(TransitionError::Occupied);
    }
    station.is_locked = true;
    station.locked_for = assignee;
    Ok(())
}

/// Release a reservation. Always valid.
pub fn unlock(station: &mut Station) {
    station.is_locked = false;
    station.locked_for = None;
}

/// Begin an occupancy. The station must be available; a locked station
/// accepts only the customer the lock was placed for (and the lock is
/// consumed by the start).
pub fn start_session(station: &mut Station, session: ActiveSession) -> Result<(), TransitionError> {
    if station.status != StationStatus::Available {
        return Err(TransitionError::NotAvailable {
            status: station.status,
        });
    }
    if station.is_locked && station.locked_for.as_deref() != Some(session.customer_name.as_str()) {
        return Err(TransitionError::Locked {
            locked_for: station.locked_for.clone(),
        });
    }
    station.is_locked = false;
    station.locked_for = None;
    station.status = StationStatus::Occupied;
    station.current_session = Some(session);
    Ok(())
}

/// Extend the live session. Rejects a stale id from an already-ended
/// session without touching the station.
pub fn add_time(
    station: &mut Station,
    session_id: &SessionId,
    minutes: i64,
) -> Result<i64, TransitionError> {
    match &mut station.current_session {
        Some(current) if &current.id == session_id => {
            current.allotted_minutes += minutes;
            current.time_remaining = (current.time_remaining + minutes).max(0);
            Ok(current.time_remaining)
        }
        Some(current) => Err(TransitionError::SessionMismatch {
            expected: session_id.clone(),
            actual: Some(current.id.clone()),
        }),
        None => Err(TransitionError::SessionMismatch {
            expected: session_id.clone(),
            actual: None,
        }),
    }
}

/// Finalize the live session into the history. Idempotent by session id:
/// a second end for the same id reports [`EndOutcome::AlreadyEnded`] and
/// leaves the history untouched.
pub fn end_session(
    station: &mut Station,
    session_id: &SessionId,
    now: DateTime<Utc>,
) -> Result<EndOutcome, TransitionError> {
    if let Some(current) = &station.current_session {
        if &current.id == session_id {
            // A record's end must come strictly after its start, even under
            // clock skew.
            let ended_at = if now > current.started_at {
                now
            } else {
                current.started_at + Duration::milliseconds(1)
            };
            let record = SessionRecord {
                id: current.id.clone(),
                customer_name: current.customer_name.clone(),
                started_at: current.started_at,
                ended_at,
            };
            station.past_sessions.push(record.clone());
            station.current_session = None;
            station.status = StationStatus::Available;
            return Ok(EndOutcome::Ended(record));
        }
        if station.has_ended(session_id) {
            return Ok(EndOutcome::AlreadyEnded);
        }
        return Err(TransitionError::SessionMismatch {
            expected: session_id.clone(),
            actual: Some(current.id.clone()),
        });
    }
    if station.has_ended(session_id) {
        return Ok(EndOutcome::AlreadyEnded);
    }
    Err(TransitionError::SessionMismatch {
        expected: session_id.clone(),
        actual: None,
    })
}

/// Toggle the operator-assistance flag. No status interaction.
pub fn set_hand(station: &mut Station, raised: bool) {
    station.hand_raised = raised;
}

/// Enter or leave maintenance. Only permitted while not occupied.
pub fn set_maintenance(station: &mut Station, on: bool) -> Result<(), TransitionError> {
    if station.status == StationStatus::Occupied {
        return Err(TransitionError::Occupied);
    }
    station.status = if on {
        StationStatus::Maintenance
    } else {
        StationStatus::Available
    };
    Ok(())
}

/// Online/offline overlay. An occupied station never drops its session on
/// an offline report; the overlay only applies to idle stations.
pub fn set_online(station: &mut Station, online: bool) {
    if online {
        if station.status == StationStatus::Offline {
            station.status = if station.current_session.is_some() {
                StationStatus::Occupied
            } else {
                StationStatus::Available
            };
        }
    } else if station.status != StationStatus::Occupied {
        station.status = StationStatus::Offline;
    }
}

/// Countdown recompute for one station. Remaining time is derived from the
/// wall clock and the purchased total, so a suspended process catches up on
/// its next tick instead of drifting. Reaching zero does NOT end the
/// session; the operator ends it explicitly.
///
/// Returns whether the displayed value changed.
pub fn tick(station: &mut Station, now: DateTime<Utc>) -> bool {
    let Some(current) = &mut station.current_session else {
        return false;
    };
    let elapsed = (now - current.started_at).num_minutes().max(0);
    let remaining = (current.allotted_minutes - elapsed).max(0);
    if remaining != current.time_remaining {
        current.time_remaining = remaining;
        true
    } else {
        false
    }
}

/// Adopt a server-computed remaining time, re-deriving the purchased total
/// so subsequent ticks agree with the server.
pub fn sync_remaining(session: &mut ActiveSession, remaining: i64, now: DateTime<Utc>) {
    let elapsed = (now - session.started_at).num_minutes().max(0);
    session.time_remaining = remaining.max(0);
    session.allotted_minutes = elapsed + session.time_remaining;
}
