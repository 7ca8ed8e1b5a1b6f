//! User intents, applied optimistically then reconciled with the backend.
//!
//! Every action follows the same shape: precondition check, optimistic
//! store mutation tagged with a correlation id, backend call, then either
//! confirmation (authoritative fields supersede the guess) or rollback plus
//! an operator-visible notification. No partial state survives a failure.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use lanboard_billing::quick_pack_for;
use lanboard_core::events::{ClientCommand, CommandSink};
use lanboard_core::ids::{CorrelationId, SessionId, StationId};
use lanboard_core::station::{ActiveSession, Station};
use lanboard_engine::{Confirmation, Intent, StationStore, StoreError};

use crate::api::{CreateStation, StartSession, StationApi, SystemConfig};
use crate::error::{ActionError, ApiError};

/// Operator-visible message about an action outcome.
#[derive(Clone, Debug)]
pub struct Notification {
    pub station_id: Option<StationId>,
    pub action: &'static str,
    pub message: String,
}

pub struct ActionGateway {
    api: Arc<dyn StationApi>,
    store: Arc<StationStore>,
    commands: Option<Arc<dyn CommandSink>>,
    notify_tx: broadcast::Sender<Notification>,
}

impl ActionGateway {
    pub fn new(api: Arc<dyn StationApi>, store: Arc<StationStore>) -> Self {
        let (notify_tx, _) = broadcast::channel(64);
        Self {
            api,
            store,
            commands: None,
            notify_tx,
        }
    }

    /// Attach the event-channel sink used for socket-borne actions
    /// (the operator-assistance flag).
    pub fn with_command_sink(mut self, sink: Arc<dyn CommandSink>) -> Self {
        self.commands = Some(sink);
        self
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.notify_tx.subscribe()
    }

    /// Fetch the full station snapshot and hydrate the store. Used once at
    /// startup and again after every reconnect.
    pub async fn fetch_and_hydrate(&self) -> Result<usize, ActionError> {
        let stations = self.api.get_stations().await.map_err(|e| ActionError::Backend {
            action: "get-stations",
            source: e,
        })?;
        let count = stations.len();
        self.store.hydrate(stations);
        info!(stations = count, "hydrated from backend snapshot");
        Ok(count)
    }

    pub async fn fetch_system_config(&self) -> Result<SystemConfig, ActionError> {
        self.api
            .get_system_config()
            .await
            .map_err(|e| ActionError::Backend {
                action: "get-system-config",
                source: e,
            })
    }

    pub async fn lock(
        &self,
        station_id: &StationId,
        assignee: Option<String>,
    ) -> Result<(), ActionError> {
        let correlation_id = self
            .store
            .apply_optimistic(station_id, Intent::Lock { assignee: assignee.clone() })?;
        match self.api.lock_station(station_id, assignee.as_deref()).await {
            Ok(()) => {
                self.store.confirm(&correlation_id, None);
                Ok(())
            }
            Err(e) => Err(self.fail(station_id, "lock", &correlation_id, e)),
        }
    }

    pub async fn unlock(&self, station_id: &StationId) -> Result<(), ActionError> {
        let correlation_id = self.store.apply_optimistic(station_id, Intent::Unlock)?;
        match self.api.unlock_station(station_id).await {
            Ok(()) => {
                self.store.confirm(&correlation_id, None);
                Ok(())
            }
            Err(e) => Err(self.fail(station_id, "unlock", &correlation_id, e)),
        }
    }

    /// Start a session. When no prepaid amount is given, the matching quick
    /// pack (if any) pre-fills it; the billed amount stays time times rate.
    /// Returns the server-assigned session id.
    pub async fn start_session(
        &self,
        station_id: &StationId,
        customer_name: impl Into<String>,
        minutes: i64,
        prepaid_amount: Option<f64>,
    ) -> Result<SessionId, ActionError> {
        let customer_name = customer_name.into();
        let prepaid = prepaid_amount.or_else(|| quick_pack_for(minutes).map(|p| p.price));

        let guess = ActiveSession::new(
            SessionId::new(),
            customer_name.clone(),
            minutes,
            prepaid,
            Utc::now(),
        );
        let correlation_id = self
            .store
            .apply_optimistic(station_id, Intent::StartSession { session: guess })?;

        let request = StartSession {
            station_id: station_id.clone(),
            customer_name,
            time_minutes: minutes,
            prepaid_amount: prepaid,
        };
        match self.api.start_session(&request).await {
            Ok(receipt) => {
                let session_id = receipt.session_id.clone();
                self.store.confirm(
                    &correlation_id,
                    Some(Confirmation {
                        session_id: Some(receipt.session_id),
                        time_remaining: receipt.time_remaining,
                    }),
                );
                Ok(session_id)
            }
            Err(e) => Err(self.fail(station_id, "start-session", &correlation_id, e)),
        }
    }

    /// End the station's live session. Requires a known session id; its
    /// absence is a precondition failure raised before any network call.
    pub async fn end_session(&self, station_id: &StationId) -> Result<(), ActionError> {
        let session_id = self.live_session_id(station_id)?;

        let correlation_id = self.store.apply_optimistic(
            station_id,
            Intent::EndSession { session_id: session_id.clone() },
        )?;
        match self.api.end_session(&session_id).await {
            Ok(_receipt) => {
                self.store.confirm(&correlation_id, None);
                Ok(())
            }
            Err(e) => Err(self.fail(station_id, "end-session", &correlation_id, e)),
        }
    }

    /// Extend the station's live session by `minutes`.
    pub async fn add_time(&self, station_id: &StationId, minutes: i64) -> Result<(), ActionError> {
        let session_id = self.live_session_id(station_id)?;

        let correlation_id = self.store.apply_optimistic(
            station_id,
            Intent::AddTime { session_id: session_id.clone(), minutes },
        )?;
        match self.api.add_time(&session_id, minutes).await {
            Ok(receipt) => {
                self.store.confirm(
                    &correlation_id,
                    Some(Confirmation {
                        session_id: None,
                        time_remaining: receipt.time_remaining,
                    }),
                );
                Ok(())
            }
            Err(e) => Err(self.fail(station_id, "add-time", &correlation_id, e)),
        }
    }

    /// Toggle the operator-assistance flag. Carried over the event channel
    /// rather than REST; rolled back when the channel is down.
    pub fn set_hand(&self, station_id: &StationId, raised: bool) -> Result<(), ActionError> {
        let correlation_id = self
            .store
            .apply_optimistic(station_id, Intent::SetHand { raised })?;

        let Some(sink) = &self.commands else {
            self.store.rollback(&correlation_id);
            return Err(ActionError::Send(
                lanboard_core::errors::CommandSendError::NotConnected,
            ));
        };
        let command = ClientCommand::SetHand {
            station_id: station_id.clone(),
            raised,
        };
        match sink.send_command(&command) {
            Ok(()) => {
                self.store.confirm(&correlation_id, None);
                Ok(())
            }
            Err(e) => {
                self.store.rollback(&correlation_id);
                self.notify(Some(station_id), "set-hand", &e.to_string());
                Err(e.into())
            }
        }
    }

    /// Deploy a new station. Plain passthrough: the station only appears in
    /// the store once the backend has accepted it.
    pub async fn create_station(&self, request: &CreateStation) -> Result<Station, ActionError> {
        match self.api.create_station(request).await {
            Ok(station) => {
                self.store.upsert_station(station.clone());
                Ok(station)
            }
            Err(e) => {
                self.notify(None, "create-station", &e.to_string());
                Err(ActionError::Backend {
                    action: "create-station",
                    source: e,
                })
            }
        }
    }

    /// Remove a station. The only-when-idle policy is the backend's call;
    /// the store just mirrors an accepted removal.
    pub async fn delete_station(&self, station_id: &StationId) -> Result<(), ActionError> {
        match self.api.delete_station(station_id).await {
            Ok(()) => {
                self.store.remove_station(station_id);
                Ok(())
            }
            Err(e) => {
                self.notify(Some(station_id), "delete-station", &e.to_string());
                Err(ActionError::Backend {
                    action: "delete-station",
                    source: e,
                })
            }
        }
    }

    fn live_session_id(&self, station_id: &StationId) -> Result<SessionId, ActionError> {
        let station = self
            .store
            .get(station_id)
            .ok_or_else(|| StoreError::UnknownStation(station_id.clone()))?;
        station
            .current_session_id()
            .cloned()
            .ok_or_else(|| ActionError::NoActiveSession(station_id.clone()))
    }

    /// Roll back an optimistic mutation and surface the failure.
    fn fail(
        &self,
        station_id: &StationId,
        action: &'static str,
        correlation_id: &CorrelationId,
        error: ApiError,
    ) -> ActionError {
        self.store.rollback(correlation_id);
        warn!(station_id = %station_id, action, error = %error, "action failed, rolled back");
        self.notify(Some(station_id), action, &error.to_string());
        ActionError::Backend {
            action,
            source: error,
        }
    }

    fn notify(&self, station_id: Option<&StationId>, action: &'static str, message: &str) {
        let _ = self.notify_tx.send(Notification {
            station_id: station_id.cloned(),
            action,
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanboard_core::errors::CommandSendError;
    use lanboard_core::station::{StationKind, StationStatus};
    use lanboard_engine::store::Intent as StoreIntent;

    use crate::mock::MockStationApi;

    fn harness() -> (Arc<MockStationApi>, Arc<StationStore>, ActionGateway, StationId) {
        let api = Arc::new(MockStationApi::new());
        let store = Arc::new(StationStore::new(16));
        let station = Station::new("PC-01", StationKind::Pc, 100.0);
        let id = station.id.clone();
        store.hydrate(vec![station]);
        let gateway = ActionGateway::new(api.clone() as Arc<dyn StationApi>, store.clone());
        (api, store, gateway, id)
    }

    #[tokio::test]
    async fn lock_failure_rolls_back_and_notifies() {
        let (api, store, gateway, id) = harness();
        let mut notifications = gateway.subscribe_notifications();
        api.fail_next(ApiError::ServerError { status: 500, body: "boom".into() });

        let err = gateway.lock(&id, Some("ada".into())).await.unwrap_err();
        assert!(matches!(err, ActionError::Backend { action: "lock", .. }));

        let station = store.get(&id).unwrap();
        assert!(!station.is_locked, "optimistic lock rolled back");
        assert!(station.locked_for.is_none());

        let note = notifications.try_recv().unwrap();
        assert_eq!(note.action, "lock");
        assert_eq!(note.station_id.as_ref(), Some(&id));
        assert!(note.message.contains("boom"));
    }

    #[tokio::test]
    async fn lock_success_confirms_and_clears_pending() {
        let (_api, store, gateway, id) = harness();
        gateway.lock(&id, None).await.unwrap();
        assert!(store.get(&id).unwrap().is_locked);
        assert_eq!(store.pending_actions(), 0);
    }

    #[tokio::test]
    async fn start_session_adopts_server_assigned_id() {
        let (_api, store, gateway, id) = harness();

        let session_id = gateway
            .start_session(&id, "ada", 60, Some(100.0))
            .await
            .unwrap();
        assert_eq!(session_id.as_str(), "sess_server_ada");

        let station = store.get(&id).unwrap();
        assert_eq!(station.status, StationStatus::Occupied);
        let session = station.current_session.as_ref().unwrap();
        assert_eq!(session.id, session_id);
        assert_eq!(session.time_remaining, 60);
    }

    #[tokio::test]
    async fn start_session_prefills_prepaid_from_quick_pack() {
        let (_api, store, gateway, id) = harness();
        gateway.start_session(&id, "ada", 60, None).await.unwrap();

        let station = store.get(&id).unwrap();
        let session = station.current_session.as_ref().unwrap();
        assert_eq!(session.prepaid_amount, Some(90.0));
    }

    #[tokio::test]
    async fn start_session_failure_restores_available() {
        let (api, store, gateway, id) = harness();
        api.fail_next(ApiError::InvalidRequest("station busy".into()));

        let err = gateway.start_session(&id, "ada", 60, None).await.unwrap_err();
        assert!(matches!(err, ActionError::Backend { action: "start-session", .. }));

        let station = store.get(&id).unwrap();
        assert_eq!(station.status, StationStatus::Available);
        assert!(station.current_session.is_none());
        assert!(station.occupancy_consistent());
    }

    #[tokio::test]
    async fn end_session_without_live_session_never_hits_the_network() {
        let (api, _store, gateway, id) = harness();
        let err = gateway.end_session(&id).await.unwrap_err();
        assert!(matches!(err, ActionError::NoActiveSession(_)));
        assert!(
            !api.calls().iter().any(|c| c == "end_session"),
            "precondition failures must not reach the backend"
        );
    }

    #[tokio::test]
    async fn end_session_failure_restores_the_live_session() {
        let (api, store, gateway, id) = harness();
        gateway.start_session(&id, "ada", 60, None).await.unwrap();

        api.fail_next(ApiError::ServerError { status: 502, body: "gateway".into() });
        let err = gateway.end_session(&id).await.unwrap_err();
        assert!(matches!(err, ActionError::Backend { action: "end-session", .. }));

        let station = store.get(&id).unwrap();
        assert_eq!(station.status, StationStatus::Occupied);
        assert!(station.current_session.is_some());
        assert!(station.past_sessions.is_empty(), "optimistic record removed");
    }

    #[tokio::test]
    async fn end_session_success_finalizes_exactly_once() {
        let (_api, store, gateway, id) = harness();
        gateway.start_session(&id, "ada", 60, None).await.unwrap();
        gateway.end_session(&id).await.unwrap();

        let station = store.get(&id).unwrap();
        assert_eq!(station.status, StationStatus::Available);
        assert_eq!(station.past_sessions.len(), 1);
        assert_eq!(store.pending_actions(), 0);

        // A second end is a precondition failure, not a duplicate record.
        let err = gateway.end_session(&id).await.unwrap_err();
        assert!(matches!(err, ActionError::NoActiveSession(_)));
        assert_eq!(store.get(&id).unwrap().past_sessions.len(), 1);
    }

    #[tokio::test]
    async fn add_time_reconciles_server_remaining() {
        let (api, store, gateway, id) = harness();
        gateway.start_session(&id, "ada", 60, None).await.unwrap();

        // Server says 85, not the optimistic 90.
        api.set_receipt_remaining(Some(85));
        gateway.add_time(&id, 30).await.unwrap();

        let station = store.get(&id).unwrap();
        assert_eq!(station.current_session.as_ref().unwrap().time_remaining, 85);
    }

    #[tokio::test]
    async fn add_time_failure_rolls_back_remaining() {
        let (api, store, gateway, id) = harness();
        gateway.start_session(&id, "ada", 60, None).await.unwrap();

        api.fail_next(ApiError::ServerError { status: 500, body: "nope".into() });
        let err = gateway.add_time(&id, 30).await.unwrap_err();
        assert!(matches!(err, ActionError::Backend { action: "add-time", .. }));
        assert_eq!(
            store.get(&id).unwrap().current_session.as_ref().unwrap().time_remaining,
            60
        );
    }

    #[tokio::test]
    async fn set_hand_without_channel_rolls_back() {
        let (_api, store, gateway, id) = harness();
        let err = gateway.set_hand(&id, true).unwrap_err();
        assert!(matches!(err, ActionError::Send(CommandSendError::NotConnected)));
        assert!(!store.get(&id).unwrap().hand_raised);
    }

    #[tokio::test]
    async fn set_hand_with_channel_applies_and_sends() {
        struct RecordingSink(parking_lot::Mutex<Vec<ClientCommand>>);
        impl CommandSink for RecordingSink {
            fn send_command(&self, command: &ClientCommand) -> Result<(), CommandSendError> {
                self.0.lock().push(command.clone());
                Ok(())
            }
        }

        let api = Arc::new(MockStationApi::new());
        let store = Arc::new(StationStore::new(16));
        let station = Station::new("PC-01", StationKind::Pc, 100.0);
        let id = station.id.clone();
        store.hydrate(vec![station]);

        let sink = Arc::new(RecordingSink(parking_lot::Mutex::new(Vec::new())));
        let gateway = ActionGateway::new(api as Arc<dyn StationApi>, store.clone())
            .with_command_sink(sink.clone() as Arc<dyn CommandSink>);

        gateway.set_hand(&id, true).unwrap();
        assert!(store.get(&id).unwrap().hand_raised);
        assert_eq!(sink.0.lock().len(), 1);
    }

    #[tokio::test]
    async fn create_and_delete_station_passthrough() {
        let (_api, store, gateway, _id) = harness();
        let created = gateway
            .create_station(&CreateStation {
                name: "PC-02".into(),
                kind: StationKind::Pc,
                hourly_rate: 120.0,
                specifications: "RTX".into(),
                ip_address: None,
                mac_address: None,
            })
            .await
            .unwrap();
        assert_eq!(store.len(), 2);

        gateway.delete_station(&created.id).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn fetch_and_hydrate_replaces_the_collection() {
        let (api, store, gateway, _id) = harness();
        api.set_stations(vec![
            Station::new("PC-10", StationKind::Pc, 100.0),
            Station::new("PS-01", StationKind::Playstation, 150.0),
        ]);

        let count = gateway.fetch_and_hydrate().await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn unknown_station_is_a_store_error() {
        let (_api, _store, gateway, _id) = harness();
        let ghost = StationId::from_raw("stn_ghost");
        let err = gateway.lock(&ghost, None).await.unwrap_err();
        assert!(matches!(err, ActionError::Store(StoreError::UnknownStation(_))));
    }

    // Keep the store-intent type exercised from this crate's perspective.
    #[test]
    fn intent_describe_names() {
        assert_eq!(StoreIntent::Unlock.describe(), "unlock");
    }
}
