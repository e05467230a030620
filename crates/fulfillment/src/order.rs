//! Order status resolution against the imagery provider's order API.

use reqwest::Client;
use scene_common::{OrderState, ResultArtifact, TransportError};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::error::transport_error;

/// Parsed status of one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderStatus {
    pub state: OrderState,
    /// Delivered files; only meaningful once the state allows proceeding.
    pub results: Vec<ResultArtifact>,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    state: String,
    #[serde(default, rename = "_links")]
    links: Option<Links>,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    #[serde(default)]
    results: Option<Vec<ResultEntry>>,
}

#[derive(Debug, Deserialize)]
struct ResultEntry {
    location: Option<String>,
    name: Option<String>,
}

/// Client for order status endpoints.
///
/// Authenticates with HTTP basic auth: the API key as user, empty password.
#[derive(Clone)]
pub struct OrderStatusClient {
    client: Client,
    api_key: String,
}

impl OrderStatusClient {
    /// `client` should carry the configured request timeout.
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
        }
    }

    /// Fetch and parse an order's status.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn status(&self, url: &str) -> Result<OrderStatus, TransportError> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.api_key, Some(""))
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| transport_error(url, e))?;
        let status = parse_status(url, &body)?;

        debug!(
            state = %status.state,
            results = status.results.len(),
            "Resolved order status"
        );
        Ok(status)
    }

    /// Classified order state only.
    pub async fn resolve(&self, url: &str) -> Result<OrderState, TransportError> {
        Ok(self.status(url).await?.state)
    }
}

/// Parse an order-status body.
pub fn parse_status(url: &str, body: &[u8]) -> Result<OrderStatus, TransportError> {
    let body: StatusBody = serde_json::from_slice(body).map_err(|e| TransportError::Malformed {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    let entries = body
        .links
        .and_then(|links| links.results)
        .unwrap_or_default();

    let mut results = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        match (entry.location, entry.name) {
            (Some(location), Some(name)) => results.push(ResultArtifact::new(location, name)),
            _ => warn!(url = %url, index = index, "Skipping result entry without location or name"),
        }
    }

    Ok(OrderStatus {
        state: OrderState::classify(&body.state),
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use test_utils::{order_status_json, FixtureResponse, FixtureServer};

    #[test]
    fn test_parse_status_results() {
        let body = order_status_json(
            "partial",
            &[("https://dl/1", "o/a_3B_AnalyticMS_SR_clip.tif"), ("https://dl/2", "o/a_metadata.json")],
        );
        let status = parse_status("u", body.to_string().as_bytes()).unwrap();
        assert_eq!(status.state, OrderState::Partial);
        assert_eq!(status.results.len(), 2);
        assert_eq!(status.results[0].file_name(), "a_3B_AnalyticMS_SR_clip.tif");
    }

    #[test]
    fn test_parse_status_skips_incomplete_entries() {
        let body = br#"{"state": "success", "_links": {"results": [
            {"location": "https://dl/1"},
            {"location": "https://dl/2", "name": "b.tif"}
        ]}}"#;
        let status = parse_status("u", body).unwrap();
        assert_eq!(status.results, vec![ResultArtifact::new("https://dl/2", "b.tif")]);
    }

    #[test]
    fn test_parse_status_without_links() {
        let status = parse_status("u", br#"{"state": "queued"}"#).unwrap();
        assert_eq!(status.state, OrderState::Pending);
        assert!(status.results.is_empty());
    }

    #[test]
    fn test_parse_status_malformed() {
        assert!(matches!(
            parse_status("u", b"<html>"),
            Err(TransportError::Malformed { .. })
        ));
        assert!(matches!(
            parse_status("u", br#"{"id": "x"}"#),
            Err(TransportError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn test_status_uses_basic_auth() {
        let server = FixtureServer::start().await;
        server.set_json("orders/v2/1", order_status_json("success", &[]));

        let client = OrderStatusClient::new(Client::new(), "pl-key");
        let state = client.resolve(&server.url("orders/v2/1")).await.unwrap();
        assert_eq!(state, OrderState::Success);

        // base64("pl-key:")
        assert_eq!(
            server.last_authorization("orders/v2/1").as_deref(),
            Some("Basic cGwta2V5Og==")
        );
    }

    #[tokio::test]
    async fn test_status_errors_are_transport_errors() {
        let server = FixtureServer::start().await;
        server.set("down", FixtureResponse::Status(503));
        server.set(
            "slow",
            FixtureResponse::Delayed(
                Duration::from_secs(5),
                Box::new(FixtureResponse::Json(order_status_json("success", &[]))),
            ),
        );

        let client = Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let client = OrderStatusClient::new(client, "k");

        assert!(matches!(
            client.status(&server.url("down")).await,
            Err(TransportError::Status { status: 503, .. })
        ));
        assert!(matches!(
            client.status(&server.url("slow")).await,
            Err(TransportError::Timeout { .. })
        ));
        assert!(matches!(
            client.status("http://127.0.0.1:1/unreachable").await,
            Err(TransportError::Request { .. })
        ));
    }
}
