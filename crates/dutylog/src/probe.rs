//! Reachability check against well-known public endpoints.
//!
//! The verdict is independent of the journal backend: an online result only
//! says a network path exists. A failed probe is not retried.

use crate::config::ProbeSettings;
use crate::error::JournalError;
use async_trait::async_trait;
use futures::future::{select_ok, BoxFuture};
use futures::FutureExt;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

#[async_trait]
pub trait Connectivity: Send + Sync {
    /// Returns true if any probe endpoint answered in time.
    async fn is_online(&self) -> bool;
}

/// Probes every endpoint concurrently; the first answer wins.
pub struct HttpProbe {
    client: Client,
    endpoints: Vec<Url>,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(settings: &ProbeSettings) -> Result<Self, JournalError> {
        let client = Client::builder()
            .connect_timeout(settings.timeout())
            .build()
            .map_err(|e| JournalError::Config {
                message: format!("Failed to build probe client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoints: settings.endpoints.clone(),
            timeout: settings.timeout(),
        })
    }

    fn probe_one(&self, url: Url) -> BoxFuture<'static, Result<Url, String>> {
        let request = self.client.head(url.clone()).send();
        let timeout = self.timeout;

        async move {
            // Any HTTP answer proves reachability, whatever its status.
            match tokio::time::timeout(timeout, request).await {
                Ok(Ok(_)) => Ok(url),
                Ok(Err(e)) => Err(format!("{url}: {e}")),
                Err(_) => Err(format!("{url}: timed out after {}ms", timeout.as_millis())),
            }
        }
        .boxed()
    }
}

#[async_trait]
impl Connectivity for HttpProbe {
    async fn is_online(&self) -> bool {
        if self.endpoints.is_empty() {
            debug!("No probe endpoints configured, reporting offline");
            return false;
        }

        let probes = self
            .endpoints
            .iter()
            .cloned()
            .map(|url| self.probe_one(url));

        match select_ok(probes).await {
            Ok((url, _pending)) => {
                debug!(endpoint = %url, "Connectivity probe succeeded");
                true
            }
            Err(last_error) => {
                info!(error = %last_error, "All connectivity probes failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_endpoints_is_offline() {
        let probe = HttpProbe::new(&ProbeSettings {
            endpoints: Vec::new(),
            timeout_ms: 100,
        })
        .unwrap();
        assert!(!probe.is_online().await);
    }

    #[tokio::test]
    async fn test_unreachable_endpoints_are_offline() {
        // Port 9 on loopback has nothing listening; the connection is refused.
        let probe = HttpProbe::new(&ProbeSettings {
            endpoints: vec![
                Url::parse("http://127.0.0.1:9/").unwrap(),
                Url::parse("http://127.0.0.1:9/alt").unwrap(),
            ],
            timeout_ms: 500,
        })
        .unwrap();
        assert!(!probe.is_online().await);
    }

    #[tokio::test]
    async fn test_any_http_answer_is_online() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new().fallback(|| async { axum::http::StatusCode::NOT_FOUND });
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let probe = HttpProbe::new(&ProbeSettings {
            endpoints: vec![
                Url::parse("http://127.0.0.1:9/").unwrap(),
                Url::parse(&format!("http://{addr}/")).unwrap(),
            ],
            timeout_ms: 2_000,
        })
        .unwrap();
        assert!(probe.is_online().await);
    }
}
