use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{SessionId, StationId};

/// Kind of physical terminal offered to customers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StationKind {
    #[serde(rename = "PC")]
    Pc,
    #[serde(rename = "PS5")]
    Playstation,
    #[serde(rename = "XBOX")]
    Xbox,
}

impl StationKind {
    /// Whether network identity fields (IP/MAC) are meaningful for this kind.
    pub fn has_network_identity(self) -> bool {
        matches!(self, Self::Pc)
    }
}

impl std::fmt::Display for StationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pc => write!(f, "PC"),
            Self::Playstation => write!(f, "PS5"),
            Self::Xbox => write!(f, "XBOX"),
        }
    }
}

/// Top-level occupancy state of a station.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StationStatus {
    Available,
    Occupied,
    Maintenance,
    Offline,
}

impl std::fmt::Display for StationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available => write!(f, "AVAILABLE"),
            Self::Occupied => write!(f, "OCCUPIED"),
            Self::Maintenance => write!(f, "MAINTENANCE"),
            Self::Offline => write!(f, "OFFLINE"),
        }
    }
}

/// A billable occupancy currently in progress.
///
/// `allotted_minutes` is the total purchased time (grows on add-time);
/// `time_remaining` is derived from it against the wall clock so a stalled
/// process catches up on its next tick instead of drifting.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    pub id: SessionId,
    pub customer_name: String,
    pub started_at: DateTime<Utc>,
    /// Total purchased minutes. Not sent by the backend; re-derived locally.
    #[serde(default)]
    pub allotted_minutes: i64,
    /// Minutes left, floored at zero.
    pub time_remaining: i64,
    /// Advisory quick-pack amount. Display only, never the billed amount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepaid_amount: Option<f64>,
}

impl ActiveSession {
    pub fn new(
        id: SessionId,
        customer_name: impl Into<String>,
        minutes: i64,
        prepaid_amount: Option<f64>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            customer_name: customer_name.into(),
            started_at,
            allotted_minutes: minutes,
            time_remaining: minutes,
            prepaid_amount,
        }
    }
}

/// A finished occupancy. Created exactly once when a session ends and
/// immutable afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: SessionId,
    pub customer_name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// A physical terminal and its occupancy state.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    pub id: StationId,
    pub name: String,
    pub kind: StationKind,
    pub hourly_rate: f64,
    #[serde(default)]
    pub specifications: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    pub status: StationStatus,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_for: Option<String>,
    #[serde(default)]
    pub hand_raised: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_session: Option<ActiveSession>,
    /// Append-only history, oldest first.
    #[serde(default)]
    pub past_sessions: Vec<SessionRecord>,
}

impl Station {
    /// A freshly deployed station: available, unlocked, empty history.
    pub fn new(name: impl Into<String>, kind: StationKind, hourly_rate: f64) -> Self {
        Self {
            id: StationId::new(),
            name: name.into(),
            kind,
            hourly_rate,
            specifications: String::new(),
            ip_address: None,
            mac_address: None,
            status: StationStatus::Available,
            is_locked: false,
            locked_for: None,
            hand_raised: false,
            current_session: None,
            past_sessions: Vec::new(),
        }
    }

    /// Invariant check: Occupied iff a current session exists.
    pub fn occupancy_consistent(&self) -> bool {
        (self.status == StationStatus::Occupied) == self.current_session.is_some()
    }

    /// Id of the live session, if any.
    pub fn current_session_id(&self) -> Option<&SessionId> {
        self.current_session.as_ref().map(|s| &s.id)
    }

    /// Whether `session_id` already appears in the past-session history.
    pub fn has_ended(&self, session_id: &SessionId) -> bool {
        self.past_sessions.iter().any(|r| &r.id == session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_station_is_available_and_unlocked() {
        let station = Station::new("PC-01", StationKind::Pc, 120.0);
        assert_eq!(station.status, StationStatus::Available);
        assert!(!station.is_locked);
        assert!(station.current_session.is_none());
        assert!(station.past_sessions.is_empty());
        assert!(station.occupancy_consistent());
    }

    #[test]
    fn kind_network_identity_is_pc_only() {
        assert!(StationKind::Pc.has_network_identity());
        assert!(!StationKind::Playstation.has_network_identity());
        assert!(!StationKind::Xbox.has_network_identity());
    }

    #[test]
    fn status_wire_names() {
        let json = serde_json::to_string(&StationStatus::Available).unwrap();
        assert_eq!(json, "\"AVAILABLE\"");
        let parsed: StationStatus = serde_json::from_str("\"MAINTENANCE\"").unwrap();
        assert_eq!(parsed, StationStatus::Maintenance);
    }

    #[test]
    fn kind_wire_names() {
        assert_eq!(serde_json::to_string(&StationKind::Pc).unwrap(), "\"PC\"");
        assert_eq!(serde_json::to_string(&StationKind::Playstation).unwrap(), "\"PS5\"");
        assert_eq!(serde_json::to_string(&StationKind::Xbox).unwrap(), "\"XBOX\"");
    }

    #[test]
    fn station_deserializes_from_minimal_payload() {
        // The backend omits local bookkeeping fields entirely.
        let json = r#"{
            "id": "stn_1",
            "name": "PC-07",
            "kind": "PC",
            "hourlyRate": 100.0,
            "status": "AVAILABLE"
        }"#;
        let station: Station = serde_json::from_str(json).unwrap();
        assert_eq!(station.name, "PC-07");
        assert!(!station.is_locked);
        assert!(!station.hand_raised);
        assert!(station.past_sessions.is_empty());
    }

    #[test]
    fn active_session_camel_case_wire() {
        let json = r#"{
            "id": "sess_1",
            "customerName": "ada",
            "startedAt": "2026-08-01T10:00:00Z",
            "timeRemaining": 45
        }"#;
        let session: ActiveSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.customer_name, "ada");
        assert_eq!(session.time_remaining, 45);
        assert_eq!(session.allotted_minutes, 0);
    }

    #[test]
    fn has_ended_checks_history() {
        let mut station = Station::new("PC-01", StationKind::Pc, 100.0);
        let sid = SessionId::new();
        assert!(!station.has_ended(&sid));
        station.past_sessions.push(SessionRecord {
            id: sid.clone(),
            customer_name: "bo".into(),
            started_at: chrono::Utc::now(),
            ended_at: chrono::Utc::now(),
        });
        assert!(station.has_ended(&sid));
    }
}
