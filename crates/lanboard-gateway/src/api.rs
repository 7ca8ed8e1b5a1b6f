//! The backend REST surface, kept as a trait so the gateway can be tested
//! against a scripted in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use lanboard_core::ids::{SessionId, StationId};
use lanboard_core::station::{Station, StationKind};

use crate::error::ApiError;

/// Payload for deploying a new station.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStation {
    pub name: String,
    pub kind: StationKind,
    pub hourly_rate: f64,
    #[serde(default)]
    pub specifications: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
}

/// Payload for starting a session.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSession {
    pub station_id: StationId,
    pub customer_name: String,
    pub time_minutes: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepaid_amount: Option<f64>,
}

/// Authoritative response to a session action. Its fields supersede the
/// optimistic guess field by field.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReceipt {
    pub session_id: SessionId,
    /// Server-computed remaining minutes, when the backend reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_remaining: Option<i64>,
}

/// Cafe-wide configuration, fetched at hydration and never mutated here.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemConfig {
    #[serde(default)]
    pub allowed_times: Vec<i64>,
    #[serde(default)]
    pub hourly_rates: HashMap<String, f64>,
    #[serde(default)]
    pub cafe_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
}

/// Commands and queries the backend exposes over REST.
#[async_trait]
pub trait StationApi: Send + Sync {
    async fn get_stations(&self) -> Result<Vec<Station>, ApiError>;
    async fn get_system_config(&self) -> Result<SystemConfig, ApiError>;

    async fn create_station(&self, request: &CreateStation) -> Result<Station, ApiError>;
    async fn delete_station(&self, station_id: &StationId) -> Result<(), ApiError>;

    async fn lock_station(
        &self,
        station_id: &StationId,
        assignee: Option<&str>,
    ) -> Result<(), ApiError>;
    async fn unlock_station(&self, station_id: &StationId) -> Result<(), ApiError>;

    async fn start_session(&self, request: &StartSession) -> Result<SessionReceipt, ApiError>;
    async fn end_session(&self, session_id: &SessionId) -> Result<SessionReceipt, ApiError>;
    async fn add_time(
        &self,
        session_id: &SessionId,
        minutes: i64,
    ) -> Result<SessionReceipt, ApiError>;
}
