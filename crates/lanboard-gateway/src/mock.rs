//! Scripted in-memory [`StationApi`] for gateway tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use lanboard_core::ids::{SessionId, StationId};
use lanboard_core::station::Station;

use crate::api::{CreateStation, SessionReceipt, StartSession, StationApi, SystemConfig};
use crate::error::ApiError;

/// Every call first records its name, then consumes a scripted failure if
/// one is queued, and otherwise succeeds with a canned response.
#[derive(Default)]
pub struct MockStationApi {
    failures: Mutex<VecDeque<ApiError>>,
    calls: Mutex<Vec<String>>,
    stations: Mutex<Vec<Station>>,
    receipt_remaining: Mutex<Option<i64>>,
}

impl MockStationApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next call, whichever it is.
    pub fn fail_next(&self, error: ApiError) {
        self.failures.lock().push_back(error);
    }

    /// Stations returned by `get_stations`.
    pub fn set_stations(&self, stations: Vec<Station>) {
        *self.stations.lock() = stations;
    }

    /// Remaining minutes reported on session receipts.
    pub fn set_receipt_remaining(&self, minutes: Option<i64>) {
        *self.receipt_remaining.lock() = minutes;
    }

    /// Names of the calls made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn begin(&self, name: &str) -> Result<(), ApiError> {
        self.calls.lock().push(name.to_string());
        match self.failures.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn receipt(&self, session_id: SessionId) -> SessionReceipt {
        SessionReceipt {
            session_id,
            time_remaining: *self.receipt_remaining.lock(),
        }
    }
}

#[async_trait]
impl StationApi for MockStationApi {
    async fn get_stations(&self) -> Result<Vec<Station>, ApiError> {
        self.begin("get_stations")?;
        Ok(self.stations.lock().clone())
    }

    async fn get_system_config(&self) -> Result<SystemConfig, ApiError> {
        self.begin("get_system_config")?;
        Ok(SystemConfig {
            allowed_times: vec![30, 60, 180, 300],
            cafe_name: "Pixel Den".into(),
            ..Default::default()
        })
    }

    async fn create_station(&self, request: &CreateStation) -> Result<Station, ApiError> {
        self.begin("create_station")?;
        Ok(Station::new(
            request.name.clone(),
            request.kind,
            request.hourly_rate,
        ))
    }

    async fn delete_station(&self, _station_id: &StationId) -> Result<(), ApiError> {
        self.begin("delete_station")
    }

    async fn lock_station(
        &self,
        _station_id: &StationId,
        _assignee: Option<&str>,
    ) -> Result<(), ApiError> {
        self.begin("lock_station")
    }

    async fn unlock_station(&self, _station_id: &StationId) -> Result<(), ApiError> {
        self.begin("unlock_station")
    }

    async fn start_session(&self, request: &StartSession) -> Result<SessionReceipt, ApiError> {
        self.begin("start_session")?;
        let receipt = SessionReceipt {
            session_id: SessionId::from_raw(format!("sess_server_{}", request.customer_name)),
            time_remaining: (*self.receipt_remaining.lock()).or(Some(request.time_minutes)),
        };
        Ok(receipt)
    }

    async fn end_session(&self, session_id: &SessionId) -> Result<SessionReceipt, ApiError> {
        self.begin("end_session")?;
        Ok(self.receipt(session_id.clone()))
    }

    async fn add_time(
        &self,
        session_id: &SessionId,
        _minutes: i64,
    ) -> Result<SessionReceipt, ApiError> {
        self.begin("add_time")?;
        Ok(self.receipt(session_id.clone()))
    }
}
