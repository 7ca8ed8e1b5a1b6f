use serde::{Deserialize, Serialize};

use crate::errors::CommandSendError;
use crate::ids::{SessionId, StationId};
use crate::station::{Station, StationStatus};

/// Session status string the backend uses to signal a finished session.
pub const SESSION_COMPLETED: &str = "COMPLETED";

/// One push event from the backend's WebSocket channel.
///
/// Unrecognized `type` values deserialize to [`PushEvent::Unknown`] so new
/// server-side event kinds never break an older dashboard.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PushEvent {
    #[serde(rename = "SESSION_UPDATE", rename_all = "camelCase")]
    SessionUpdate {
        station_id: StationId,
        /// "COMPLETED" ends the session; anything else means occupied.
        status: String,
        session_id: SessionId,
        /// Server clock at emit time, epoch milliseconds.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_time: Option<i64>,
        /// Scheduled session end, epoch milliseconds.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end_time: Option<i64>,
    },

    #[serde(rename = "STATION_STATUS", rename_all = "camelCase")]
    StationStatus {
        station_id: StationId,
        status: StationStatus,
        online: bool,
    },

    #[serde(rename = "STATION_UPDATE", rename_all = "camelCase")]
    StationUpdate { station: Station },

    /// Consumed by the analytics views, not by this core.
    #[serde(rename = "analytics_update")]
    AnalyticsUpdate {
        #[serde(default)]
        payload: serde_json::Value,
    },

    #[serde(other)]
    Unknown,
}

impl PushEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionUpdate { .. } => "SESSION_UPDATE",
            Self::StationStatus { .. } => "STATION_STATUS",
            Self::StationUpdate { .. } => "STATION_UPDATE",
            Self::AnalyticsUpdate { .. } => "analytics_update",
            Self::Unknown => "unknown",
        }
    }

    /// Station the event refers to, when it names one.
    pub fn station_id(&self) -> Option<&StationId> {
        match self {
            Self::SessionUpdate { station_id, .. } | Self::StationStatus { station_id, .. } => {
                Some(station_id)
            }
            Self::StationUpdate { station } => Some(&station.id),
            Self::AnalyticsUpdate { .. } | Self::Unknown => None,
        }
    }
}

/// A command sent upstream over the event channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientCommand {
    /// Identify this dashboard to the server after connecting.
    #[serde(rename = "HELLO", rename_all = "camelCase")]
    Hello { client: String },

    /// Ask the server to replay current state after a reconnect.
    #[serde(rename = "RESYNC")]
    Resync,

    /// Operator-assistance flag toggle for a station.
    #[serde(rename = "SET_HAND", rename_all = "camelCase")]
    SetHand { station_id: StationId, raised: bool },
}

/// Outbound half of the event channel, kept as a trait so the gateway can
/// send commands without depending on the transport implementation.
pub trait CommandSink: Send + Sync {
    fn send_command(&self, command: &ClientCommand) -> Result<(), CommandSendError>;
}
