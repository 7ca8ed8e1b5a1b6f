//! The canonical, observable collection of stations.
//!
//! All mutation funnels through this type: remote push events, optimistic
//! local intents, reconciliation, and countdown ticks. Subscribers receive
//! the complete latest snapshot after every change, never deltas, so each
//! view re-derives its rows from one coherent state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use lanboard_core::errors::TransitionError;
use lanboard_core::events::{PushEvent, SESSION_COMPLETED};
use lanboard_core::ids::{CorrelationId, SessionId, StationId};
use lanboard_core::station::{ActiveSession, Station, StationStatus};

use crate::error::StoreError;
use crate::lifecycle::{self, EndOutcome};

/// Above this value an incoming `time_remaining` is interpreted as seconds
/// rather than minutes. The upstream session timer reports either unit
/// depending on code path; this store is the single place that normalizes.
pub const MINUTES_THRESHOLD: i64 = 1000;

/// Convert a raw `time_remaining` to whole minutes (ceiling for seconds).
pub fn normalize_minutes(raw: i64) -> i64 {
    let raw = raw.max(0);
    if raw > MINUTES_THRESHOLD {
        (raw + 59) / 60
    } else {
        raw
    }
}

/// A user intent applied optimistically ahead of backend confirmation.
#[derive(Clone, Debug)]
pub enum Intent {
    Lock { assignee: Option<String> },
    Unlock,
    StartSession { session: ActiveSession },
    EndSession { session_id: SessionId },
    AddTime { session_id: SessionId, minutes: i64 },
    SetHand { raised: bool },
}

impl Intent {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Lock { .. } => "lock",
            Self::Unlock => "unlock",
            Self::StartSession { .. } => "start-session",
            Self::EndSession { .. } => "end-session",
            Self::AddTime { .. } => "add-time",
            Self::SetHand { .. } => "set-hand",
        }
    }

    /// Session the intent refers to, when it names one.
    fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::StartSession { session } => Some(&session.id),
            Self::EndSession { session_id } | Self::AddTime { session_id, .. } => Some(session_id),
            _ => None,
        }
    }
}

/// Authoritative fields from a backend response that supersede the
/// optimistic guess field by field.
#[derive(Clone, Debug, Default)]
pub struct Confirmation {
    /// The true session id assigned by the server.
    pub session_id: Option<SessionId>,
    /// Server-computed remaining minutes.
    pub time_remaining: Option<i64>,
}

/// An optimistic mutation awaiting its authoritative outcome.
struct Pending {
    station_id: StationId,
    prior: Station,
    intent: Intent,
}

pub struct StationStore {
    stations: RwLock<HashMap<StationId, Station>>,
    pending: DashMap<CorrelationId, Pending>,
    snapshot_tx: broadcast::Sender<Vec<Station>>,
}

impl StationStore {
    pub fn new(snapshot_capacity: usize) -> Self {
        let (snapshot_tx, _) = broadcast::channel(snapshot_capacity);
        Self {
            stations: RwLock::new(HashMap::new()),
            pending: DashMap::new(),
            snapshot_tx,
        }
    }

    /// Register a view. Every mutation delivers the full latest snapshot;
    /// a lagged receiver skips ahead to newer snapshots rather than
    /// blocking the store. Dropping the receiver unsubscribes immediately.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<Station>> {
        self.snapshot_tx.subscribe()
    }

    /// Current full state, ordered by station name for stable display.
    pub fn snapshot(&self) -> Vec<Station> {
        let map = self.stations.read();
        let mut stations: Vec<Station> = map.values().cloned().collect();
        stations.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.as_str().cmp(b.id.as_str())));
        stations
    }

    pub fn get(&self, id: &StationId) -> Option<Station> {
        self.stations.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.stations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.read().is_empty()
    }

    /// Wholesale replacement from a REST snapshot. Applies unit
    /// normalization to each live session's `time_remaining`, re-derives
    /// the purchased total, enforces the occupancy invariant, and discards
    /// all pending optimism (the snapshot is fresher than any local guess).
    pub fn hydrate(&self, stations: Vec<Station>) {
        self.hydrate_at(stations, Utc::now());
    }

    pub fn hydrate_at(&self, stations: Vec<Station>, now: DateTime<Utc>) {
        let mut map = HashMap::with_capacity(stations.len());
        for mut station in stations {
            if let Some(session) = &mut station.current_session {
                session.time_remaining = normalize_minutes(session.time_remaining);
                let elapsed = (now - session.started_at).num_minutes().max(0);
                session.allotted_minutes = elapsed + session.time_remaining;
                station.status = StationStatus::Occupied;
            } else if station.status == StationStatus::Occupied {
                station.status = StationStatus::Available;
            }
            map.insert(station.id.clone(), station);
        }

        let count = map.len();
        *self.stations.write() = map;
        self.pending.clear();
        debug!(stations = count, "hydrated station collection");
        self.publish();
    }

    /// Merge one push event. Unknown event types and events for unknown
    /// stations are ignored; no event ever panics the store.
    pub fn apply_remote_event(&self, event: PushEvent) {
        self.apply_remote_event_at(event, Utc::now());
    }

    pub fn apply_remote_event_at(&self, event: PushEvent, now: DateTime<Utc>) {
        match event {
            PushEvent::SessionUpdate {
                station_id,
                status,
                session_id,
                end_time,
                ..
            } => {
                {
                    let mut map = self.stations.write();
                    let Some(station) = map.get_mut(&station_id) else {
                        debug!(station_id = %station_id, "session update for unknown station ignored");
                        return;
                    };

                    if status == SESSION_COMPLETED {
                        match lifecycle::end_session(station, &session_id, now) {
                            Ok(EndOutcome::Ended(_)) => {}
                            Ok(EndOutcome::AlreadyEnded) => {
                                debug!(session_id = %session_id, "duplicate session end ignored");
                            }
                            Err(e) => {
                                warn!(station_id = %station_id, session_id = %session_id, error = %e,
                                    "remote session end rejected");
                                return;
                            }
                        }
                    } else {
                        let remaining = end_time
                            .map(|end| (end - now.timestamp_millis()) / 60_000)
                            .unwrap_or(0)
                            .max(0);
                        match &mut station.current_session {
                            Some(current) if current.id == session_id => {
                                lifecycle::sync_remaining(current, remaining, now);
                            }
                            _ => {
                                // Occupied from another console; we learn the
                                // session id and timing now, the customer name
                                // arrives with the next station refresh.
                                let session = ActiveSession::new(
                                    session_id.clone(),
                                    String::new(),
                                    remaining,
                                    None,
                                    now,
                                );
                                station.current_session = Some(session);
                                station.status = StationStatus::Occupied;
                            }
                        }
                    }
                }
                // The server has spoken for this session: any optimistic
                // mutation about it is superseded, not duplicated.
                self.supersede(&station_id, &session_id);
                self.publish();
            }

            PushEvent::StationStatus {
                station_id,
                status,
                online,
            } => {
                {
                    let mut map = self.stations.write();
                    let Some(station) = map.get_mut(&station_id) else {
                        debug!(station_id = %station_id, "status update for unknown station ignored");
                        return;
                    };
                    lifecycle::set_online(station, online);
                    if online {
                        apply_reported_status(station, status);
                    }
                }
                self.publish();
            }

            PushEvent::StationUpdate { station: incoming } => {
                {
                    let mut map = self.stations.write();
                    let Some(existing) = map.get_mut(&incoming.id) else {
                        debug!(station_id = %incoming.id, "refresh for unknown station ignored");
                        return;
                    };
                    let mut next = incoming;
                    // History is append-only; a refresh that omits it must
                    // not shrink what we already recorded.
                    if next.past_sessions.len() < existing.past_sessions.len() {
                        next.past_sessions = existing.past_sessions.clone();
                    }
                    // Replay pending optimism on top of the refresh so a
                    // stale remote snapshot does not clobber, e.g., a lock
                    // the operator just placed.
                    for entry in self.pending.iter() {
                        if entry.station_id == next.id {
                            if let Err(e) = apply_intent(&mut next, &entry.intent, Utc::now()) {
                                debug!(station_id = %next.id, intent = entry.intent.describe(),
                                    error = %e, "pending intent no longer applies after refresh");
                            }
                        }
                    }
                    *existing = next;
                }
                self.publish();
            }

            PushEvent::AnalyticsUpdate { .. } => {
                // Consumed by the analytics views, not this store.
            }

            PushEvent::Unknown => {
                debug!("unknown push event type ignored");
            }
        }
    }

    /// Apply a not-yet-confirmed local intent through the same transition
    /// functions remote events use, and tag it for later reconciliation.
    pub fn apply_optimistic(
        &self,
        station_id: &StationId,
        intent: Intent,
    ) -> Result<CorrelationId, StoreError> {
        let correlation_id = {
            let mut map = self.stations.write();
            let station = map
                .get_mut(station_id)
                .ok_or_else(|| StoreError::UnknownStation(station_id.clone()))?;
            let prior = station.clone();
            apply_intent(station, &intent, Utc::now())?;
            let correlation_id = CorrelationId::new();
            self.pending.insert(
                correlation_id.clone(),
                Pending {
                    station_id: station_id.clone(),
                    prior,
                    intent,
                },
            );
            correlation_id
        };
        self.publish();
        Ok(correlation_id)
    }

    /// Settle an optimistic mutation with the backend's authoritative
    /// response. Fields in the confirmation supersede the optimistic guess;
    /// a correlation id already superseded by a remote echo is a no-op.
    pub fn confirm(&self, correlation_id: &CorrelationId, authoritative: Option<Confirmation>) {
        let Some((_, pending)) = self.pending.remove(correlation_id) else {
            debug!(correlation_id = %correlation_id, "confirmation for superseded action ignored");
            return;
        };
        let Some(confirmation) = authoritative else {
            return;
        };

        let mut changed = false;
        {
            let mut map = self.stations.write();
            let Some(station) = map.get_mut(&pending.station_id) else {
                return;
            };
            if let Some(current) = &mut station.current_session {
                // Adopt the server-assigned id in place of a local guess.
                if let (Intent::StartSession { session }, Some(true_id)) =
                    (&pending.intent, confirmation.session_id)
                {
                    if current.id == session.id {
                        current.id = true_id;
                        changed = true;
                    }
                }
                if let Some(remaining) = confirmation.time_remaining {
                    lifecycle::sync_remaining(current, normalize_minutes(remaining), Utc::now());
                    changed = true;
                }
            }
        }
        if changed {
            self.publish();
        }
    }

    /// Undo an optimistic mutation after a backend failure. Only the fields
    /// the intent touched are restored, so interleaved remote truth about
    /// the same station survives. Returns false when the action was already
    /// superseded by an authoritative event.
    pub fn rollback(&self, correlation_id: &CorrelationId) -> bool {
        let Some((_, pending)) = self.pending.remove(correlation_id) else {
            debug!(correlation_id = %correlation_id, "rollback for superseded action ignored");
            return false;
        };

        let reverted = {
            let mut map = self.stations.write();
            let Some(station) = map.get_mut(&pending.station_id) else {
                return false;
            };
            revert_intent(station, &pending.intent, &pending.prior)
        };
        if reverted {
            self.publish();
        }
        reverted
    }

    /// Insert or replace a station (create-station passthrough, full
    /// refreshes of stations we already track go through push events).
    pub fn upsert_station(&self, station: Station) {
        self.stations.write().insert(station.id.clone(), station);
        self.publish();
    }

    /// Remove a station (delete-station passthrough). The backend enforces
    /// the only-when-idle policy; the store just mirrors the result.
    pub fn remove_station(&self, id: &StationId) -> bool {
        let removed = self.stations.write().remove(id).is_some();
        if removed {
            self.pending.retain(|_, p| &p.station_id != id);
            self.publish();
        }
        removed
    }

    /// One countdown pass over every occupied station.
    pub fn tick_all(&self, now: DateTime<Utc>) {
        let changed = {
            let mut map = self.stations.write();
            let mut changed = false;
            for station in map.values_mut() {
                changed |= lifecycle::tick(station, now);
            }
            changed
        };
        if changed {
            self.publish();
        }
    }

    /// Number of in-flight optimistic actions (diagnostics and tests).
    pub fn pending_actions(&self) -> usize {
        self.pending.len()
    }

    /// Drop pending optimism made moot by an authoritative event about
    /// `session_id` on `station_id`. An optimistic start is matched by
    /// station alone: its locally guessed id never equals the server's.
    fn supersede(&self, station_id: &StationId, session_id: &SessionId) {
        self.pending.retain(|_, p| {
            if &p.station_id != station_id {
                return true;
            }
            match &p.intent {
                Intent::StartSession { .. } => false,
                _ => p.intent.session_id() != Some(session_id),
            }
        });
    }

    fn publish(&self) {
        let _ = self.snapshot_tx.send(self.snapshot());
    }
}

/// Route an intent through the lifecycle transition functions.
fn apply_intent(
    station: &mut Station,
    intent: &Intent,
    now: DateTime<Utc>,
) -> Result<(), TransitionError> {
    match intent {
        Intent::Lock { assignee } => lifecycle::lock(station, assignee.clone()),
        Intent::Unlock => {
            lifecycle::unlock(station);
            Ok(())
        }
        Intent::StartSession { session } => lifecycle::start_session(station, session.clone()),
        Intent::EndSession { session_id } => {
            lifecycle::end_session(station, session_id, now).map(|_| ())
        }
        Intent::AddTime {
            session_id,
            minutes,
        } => lifecycle::add_time(station, session_id, *minutes).map(|_| ()),
        Intent::SetHand { raised } => {
            lifecycle::set_hand(station, *raised);
            Ok(())
        }
    }
}

/// Restore only the fields an intent touched, from the pre-action image.
fn revert_intent(station: &mut Station, intent: &Intent, prior: &Station) -> bool {
    match intent {
        Intent::Lock { .. } | Intent::Unlock => {
            station.is_locked = prior.is_locked;
            station.locked_for = prior.locked_for.clone();
            true
        }
        Intent::SetHand { .. } => {
            station.hand_raised = prior.hand_raised;
            true
        }
        Intent::StartSession { session } => {
            if station.current_session_id() == Some(&session.id) {
                station.current_session = None;
                station.status = prior.status;
                station.is_locked = prior.is_locked;
                station.locked_for = prior.locked_for.clone();
                true
            } else {
                false
            }
        }
        Intent::EndSession { session_id } => {
            // Pop the record the optimistic end appended and restore the
            // live session, unless newer truth replaced it meanwhile.
            if station.current_session.is_none() && station.has_ended(session_id) {
                station.past_sessions.retain(|r| &r.id != session_id);
                station.current_session = prior.current_session.clone();
                station.status = prior.status;
                true
            } else {
                false
            }
        }
        Intent::AddTime { session_id, .. } => match &mut station.current_session {
            Some(current) if &current.id == session_id => {
                if let Some(prior_session) = &prior.current_session {
                    current.allotted_minutes = prior_session.allotted_minutes;
                    current.time_remaining = prior_session.time_remaining;
                }
                true
            }
            _ => false,
        },
    }
}

/// Adopt a remotely reported status only when it cannot break the
/// occupancy invariant; conflicting reports wait for the session event.
fn apply_reported_status(station: &mut Station, status: StationStatus) {
    let consistent = match status {
        StationStatus::Occupied => station.current_session.is_some(),
        StationStatus::Available | StationStatus::Maintenance => {
            station.current_session.is_none()
        }
        StationStatus::Offline => station.current_session.is_none(),
    };
    if consistent {
        station.status = status;
    } else {
        debug!(station_id = %station.id, reported = %status,
            "reported status conflicts with session presence, deferred");
    }
}
