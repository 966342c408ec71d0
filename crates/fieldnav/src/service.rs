//! Dispatch service client.
//!
//! [`DispatchService`] is the port the engine uses for everything remote:
//! route calculation, the active incident feed and operator messages.
//! [`HttpDispatchService`] talks JSON over HTTP to the control-room backend.

use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{Config, ServiceConfig};
use crate::error::{Error, Result};
use crate::incidents::IncidentRecord;
use crate::messaging::OutgoingMessage;
use crate::route::{RouteRequest, RouteResponse};

/// Endpoint label for route calculation.
pub const ROUTE_ENDPOINT: &str = "route";
/// Endpoint label for the incident feed.
pub const INCIDENTS_ENDPOINT: &str = "incidents";
/// Endpoint label for operator messages.
pub const MESSAGES_ENDPOINT: &str = "messages";

/// Remote operations used by the engine.
#[async_trait]
pub trait DispatchService: Send + Sync + fmt::Debug {
    /// Ask the routing service for a path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NetworkUnreachable`] or [`Error::ServiceError`].
    async fn calculate_route(&self, request: &RouteRequest) -> Result<RouteResponse>;

    /// Fetch the active incident feed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NetworkUnreachable`] or [`Error::ServiceError`].
    async fn active_incidents(&self) -> Result<Vec<IncidentRecord>>;

    /// Post an operator message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NetworkUnreachable`] or [`Error::ServiceError`].
    async fn send_message(&self, message: &OutgoingMessage) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// HTTP client for the control-room backend.
#[derive(Debug, Clone)]
pub struct HttpDispatchService {
    client: Client,
    base_url: String,
}

impl HttpDispatchService {
    /// Create a client for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create a client from the full configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.service)
    }

    /// The backend root URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::network(endpoint, e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::network(endpoint, e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or_else(|_| status.canonical_reason().unwrap_or("error").to_string());
            warn!(endpoint, status = status.as_u16(), error = %message, "Dispatch service error");
            return Err(Error::service(endpoint, status.as_u16(), message));
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::service(endpoint, 0, format!("invalid response body: {e}")))
    }
}

#[async_trait]
impl DispatchService for HttpDispatchService {
    async fn calculate_route(&self, request: &RouteRequest) -> Result<RouteResponse> {
        debug!(start = %request.start, end = %request.end, avoid = ?request.avoid, "Requesting route");
        let builder = self
            .client
            .post(self.url("/api/path/calculate"))
            .json(request);
        self.execute(ROUTE_ENDPOINT, builder).await
    }

    async fn active_incidents(&self) -> Result<Vec<IncidentRecord>> {
        let builder = self.client.get(self.url("/api/anomalies/active"));
        self.execute(INCIDENTS_ENDPOINT, builder).await
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<()> {
        let builder = self.client.post(self.url("/api/messages")).json(message);
        let _: IgnoredAny = self.execute(MESSAGES_ENDPOINT, builder).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use super::*;

    /// Serve one canned HTTP response and hand back the raw request.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let task = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut stream = BufReader::new(socket);
            let mut raw = String::new();
            let mut length = 0;
            loop {
                let mut line = String::new();
                stream.read_line(&mut line).await.unwrap();
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    length = value.trim().parse().unwrap();
                }
                raw.push_str(&line);
                if line.trim_end().is_empty() {
                    break;
                }
            }
            let mut payload = vec![0_u8; length];
            stream.read_exact(&mut payload).await.unwrap();
            raw.push_str(&String::from_utf8_lossy(&payload));

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.get_mut().write_all(response.as_bytes()).await.unwrap();
            stream.get_mut().shutdown().await.ok();
            raw
        });

        (format!("http://{addr}"), task)
    }

    fn client(base_url: String) -> HttpDispatchService {
        HttpDispatchService::new(&ServiceConfig {
            base_url,
            request_timeout_secs: 5,
            ..ServiceConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let service = client("http://localhost:5000/".to_string());
        assert_eq!(service.base_url(), "http://localhost:5000");
        assert_eq!(service.url("/api/messages"), "http://localhost:5000/api/messages");
    }

    #[tokio::test]
    async fn test_calculate_route() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"path_nodes":["Entrance","Security Gate","Main Stage"],"instructions":["a","b","c"],"voice_instructions":["x"],"total_distance_meters":300}"#,
        )
        .await;

        let request = RouteRequest::new("Entrance", "Main Stage", vec!["Food Court".to_string()]);
        let response = client(url).calculate_route(&request).await.unwrap();
        assert_eq!(response.path_nodes.len(), 3);
        assert_eq!(response.total_distance_meters, Some(300.0));
        assert_eq!(response.estimated_time_minutes, None);

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /api/path/calculate"));
        assert!(raw.contains(r#""avoid":["Food Court"]"#));
    }

    #[tokio::test]
    async fn test_service_error_body() {
        let (url, _server) = serve_once("404 Not Found", r#"{"error": "No path found"}"#).await;

        let request = RouteRequest::new("Entrance", "Nowhere", Vec::new());
        let err = client(url).calculate_route(&request).await.unwrap_err();
        assert!(matches!(
            err,
            Error::ServiceError { status: 404, ref message, .. } if message == "No path found"
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_service_error_without_body() {
        let (url, _server) = serve_once("500 Internal Server Error", "oops").await;
        let err = client(url).active_incidents().await.unwrap_err();
        assert!(matches!(err, Error::ServiceError { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let (url, _server) = serve_once("200 OK", "not json").await;
        let err = client(url).active_incidents().await.unwrap_err();
        assert!(matches!(err, Error::ServiceError { status: 0, .. }));
    }

    #[tokio::test]
    async fn test_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let request = RouteRequest::new("Entrance", "Main Stage", Vec::new());
        let err = client(format!("http://{addr}"))
            .calculate_route(&request)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NetworkUnreachable { endpoint: "route", .. }));
    }

    #[tokio::test]
    async fn test_active_incidents() {
        let (url, server) = serve_once(
            "200 OK",
            r#"[{"id":"main-stage_1","type":"crowd_surge","confidence":92,"status":"active","location":"Main Stage","description":"Pushing near barrier","timestamp":"2025-11-16T10:00:00Z","imageUrl":"/placeholder.svg"}]"#,
        )
        .await;

        let records = client(url).active_incidents().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, "crowd_surge");
        assert_eq!(records[0].image_url.as_deref(), Some("/placeholder.svg"));

        let raw = server.await.unwrap();
        assert!(raw.starts_with("GET /api/anomalies/active"));
    }

    #[tokio::test]
    async fn test_send_message() {
        let (url, server) = serve_once("200 OK", r#"{"status":"sent","message":{}}"#).await;

        let msg = OutgoingMessage::new("Responder", "On my way", None).unwrap();
        client(url).send_message(&msg).await.unwrap();

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /api/messages"));
        assert!(raw.contains(r#""incidentId":null"#));
    }
}
