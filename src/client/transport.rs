//! Beat transports.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;

use crate::error::{HeartbeatError, HeartbeatResult};
use crate::protocol::BeatRequest;

/// One request/response round trip to the coordinator.
pub trait BeatTransport: Send + Sync + 'static {
    /// Deliver `request` and return the body of a success response.
    ///
    /// Network failures and non-success statuses are `Transport` errors;
    /// for the latter the response body is the error message.
    fn send(&self, request: &BeatRequest) -> impl Future<Output = HeartbeatResult<String>> + Send;
}

/// Form POSTs over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    /// Create a transport for the beat endpoint at `url`. Each request is
    /// abandoned after `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> HeartbeatResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HeartbeatError::Config {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl BeatTransport for HttpTransport {
    async fn send(&self, request: &BeatRequest) -> HeartbeatResult<String> {
        let response = self.client.post(&self.url).form(request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            return Err(HeartbeatError::Transport {
                message: body.trim().to_string(),
            });
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{}/heartbeat", addr);
        let transport = HttpTransport::new(url, Duration::from_secs(2)).unwrap();
        let result = transport.send(&BeatRequest::default()).await;
        assert!(matches!(result, Err(HeartbeatError::Transport { .. })));
    }
}
