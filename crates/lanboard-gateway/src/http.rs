//! reqwest-backed implementation of [`StationApi`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use lanboard_core::ids::{SessionId, StationId};
use lanboard_core::station::Station;

use crate::api::{CreateStation, SessionReceipt, StartSession, StationApi, SystemConfig};
use crate::error::ApiError;

pub struct HttpStationApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStationApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.client.get(self.url(path)).send().await?;
        Self::decode(path, response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        Self::decode(path, response).await
    }

    async fn post_empty<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), ApiError> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        Self::check(path, response).await
    }

    async fn decode<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(path, status = status.as_u16(), "backend rejected request");
            return Err(ApiError::from_status(status.as_u16(), body));
        }
        response.json::<T>().await.map_err(ApiError::from)
    }

    async fn check(path: &str, response: reqwest::Response) -> Result<(), ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(path, status = status.as_u16(), "backend rejected request");
            return Err(ApiError::from_status(status.as_u16(), body));
        }
        Ok(())
    }
}

#[async_trait]
impl StationApi for HttpStationApi {
    async fn get_stations(&self) -> Result<Vec<Station>, ApiError> {
        self.get_json("/stations").await
    }

    async fn get_system_config(&self) -> Result<SystemConfig, ApiError> {
        self.get_json("/system-config").await
    }

    async fn create_station(&self, request: &CreateStation) -> Result<Station, ApiError> {
        self.post_json("/stations", request).await
    }

    async fn delete_station(&self, station_id: &StationId) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.url(&format!("/stations/{station_id}")))
            .send()
            .await?;
        Self::check("/stations/{id}", response).await
    }

    async fn lock_station(
        &self,
        station_id: &StationId,
        assignee: Option<&str>,
    ) -> Result<(), ApiError> {
        self.post_empty(
            &format!("/stations/{station_id}/lock"),
            &serde_json::json!({ "assignee": assignee }),
        )
        .await
    }

    async fn unlock_station(&self, station_id: &StationId) -> Result<(), ApiError> {
        self.post_empty(
            &format!("/stations/{station_id}/unlock"),
            &serde_json::json!({}),
        )
        .await
    }

    async fn start_session(&self, request: &StartSession) -> Result<SessionReceipt, ApiError> {
        self.post_json("/sessions", request).await
    }

    async fn end_session(&self, session_id: &SessionId) -> Result<SessionReceipt, ApiError> {
        self.post_json(
            &format!("/sessions/{session_id}/end"),
            &serde_json::json!({}),
        )
        .await
    }

    async fn add_time(
        &self,
        session_id: &SessionId,
        minutes: i64,
    ) -> Result<SessionReceipt, ApiError> {
        self.post_json(
            &format!("/sessions/{session_id}/add-time"),
            &serde_json::json!({ "minutes": minutes }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let api = HttpStationApi::new("http://cafe.local:8080/");
        assert_eq!(api.url("/stations"), "http://cafe.local:8080/stations");
    }
}
