//! [`RemoteApi`] over HTTP.

use crate::config::HttpRemoteConfig;
use crate::remote::{RemoteApi, RemoteError, RemoteResult, is_retryable_status};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use wayfare_model::{ActionResult, Item, ItemUpdate, NewItem, NewTrip, Trip, TripUpdate};
use wayfare_types::{ItemId, TripId};

#[derive(Serialize)]
struct PurchasedBody {
    purchased: bool,
}

/// REST client for the remote mutation API.
pub struct HttpRemote {
    config: HttpRemoteConfig,
    client: Client,
}

impl HttpRemote {
    pub fn new(config: HttpRemoteConfig) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RemoteError::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &HttpRemoteConfig {
        &self.config
    }

    /// Replaces the bearer token, e.g. after a session refresh.
    pub fn set_auth_token(&mut self, token: Option<String>) {
        self.config.auth_token = token;
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> RemoteResult<ActionResult<T>> {
        let request = match &self.config.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await.map_err(map_reqwest)?;
        let status = response.status();
        let body = response.bytes().await.map_err(map_reqwest)?;
        debug!(status = status.as_u16(), bytes = body.len(), "remote response");

        if status.is_success() {
            return serde_json::from_slice(&body).map_err(|e| RemoteError::Decode(e.to_string()));
        }

        // A structured failure body is the server's answer, not a transport error.
        if status.is_client_error() {
            if let Ok(mut result) = serde_json::from_slice::<ActionResult<T>>(&body) {
                if !result.success {
                    if result.retryable.is_none() {
                        result.retryable = Some(is_retryable_status(status.as_u16()));
                    }
                    return Ok(result);
                }
            }
        }

        Err(RemoteError::Http {
            status: status.as_u16(),
            message: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

fn map_reqwest(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else if err.is_decode() {
        RemoteError::Decode(err.to_string())
    } else {
        RemoteError::Network(err.to_string())
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn create_trip(&self, trip: &NewTrip) -> RemoteResult<ActionResult<Trip>> {
        self.send(self.client.post(self.url("/trips")).json(trip)).await
    }

    async fn update_trip(&self, update: &TripUpdate) -> RemoteResult<ActionResult<Trip>> {
        let url = self.url(&format!("/trips/{}", update.id));
        self.send(self.client.patch(url).json(&update.patch)).await
    }

    async fn delete_trip(&self, id: TripId) -> RemoteResult<ActionResult<()>> {
        let url = self.url(&format!("/trips/{id}"));
        self.send(self.client.delete(url)).await
    }

    async fn create_item(&self, item: &NewItem) -> RemoteResult<ActionResult<Item>> {
        let url = self.url(&format!("/trips/{}/items", item.trip_id));
        self.send(self.client.post(url).json(item)).await
    }

    async fn update_item(&self, update: &ItemUpdate) -> RemoteResult<ActionResult<Item>> {
        let url = self.url(&format!("/items/{}", update.id));
        self.send(self.client.patch(url).json(&update.patch)).await
    }

    async fn delete_item(&self, id: ItemId) -> RemoteResult<ActionResult<()>> {
        let url = self.url(&format!("/items/{id}"));
        self.send(self.client.delete(url)).await
    }

    async fn toggle_purchased(
        &self,
        id: ItemId,
        purchased: bool,
    ) -> RemoteResult<ActionResult<Item>> {
        let url = self.url(&format!("/items/{id}/purchased"));
        self.send(self.client.post(url).json(&PurchasedBody { purchased }))
            .await
    }
}
