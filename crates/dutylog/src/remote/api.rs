//! Client for the `/journals` intermediary API served by `dutylog serve`

use super::RemoteStore;
use crate::config::StoreSecrets;
use crate::error::JournalError;
use crate::journal::assemble::relational::{from_document, summary_from_row, to_document};
use crate::journal::assemble::{JournalDocument, JournalRow};
use crate::journal::{Journal, JournalSummary};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Deserialize)]
struct Created {
    id: Value,
}

#[derive(Deserialize)]
struct Outcome {
    success: bool,
}

pub struct ApiGateway {
    client: Client,
    base: Url,
    key: Option<String>,
}

impl ApiGateway {
    /// Gateway for the API rooted at `base`, sending no credentials.
    pub fn new(base: Url, timeout: Duration) -> Result<Self, JournalError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| JournalError::Config {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base,
            key: None,
        })
    }

    /// Gateway for the API at the configured store URL, authenticating with its key.
    pub fn from_secrets(secrets: &StoreSecrets, timeout: Duration) -> Result<Self, JournalError> {
        let mut gateway = Self::new(secrets.url.clone(), timeout)?;
        gateway.key = Some(secrets.key.clone());
        Ok(gateway)
    }

    fn journals_url(&self, id: Option<&str>) -> Result<Url, JournalError> {
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| JournalError::Config {
                message: format!("{} cannot be used as an API base", self.base),
            })?;
            segments.pop_if_empty().push("journals");
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Maps a non-2xx answer to a remote error carrying the API's message.
    async fn check(operation: &'static str, response: Response) -> Result<Response, JournalError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message = body
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("returned status {status}"));

        Err(JournalError::Remote {
            operation,
            status: Some(status.as_u16()),
            message,
        })
    }

    async fn decode<T: DeserializeOwned>(
        operation: &'static str,
        response: Response,
    ) -> Result<T, JournalError> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| JournalError::Remote {
            operation,
            status: None,
            message: format!("unexpected response body: {e}"),
        })
    }

    async fn expect_success(operation: &'static str, response: Response) -> Result<(), JournalError> {
        let outcome: Outcome = Self::decode(operation, Self::check(operation, response).await?).await?;
        if outcome.success {
            Ok(())
        } else {
            Err(JournalError::remote(operation, "service reported failure"))
        }
    }
}

#[async_trait]
impl RemoteStore for ApiGateway {
    async fn create(&self, journal: &Journal) -> Result<String, JournalError> {
        let url = self.journals_url(None)?;
        let response = self
            .request(Method::POST, url)
            .json(&to_document(journal))
            .send()
            .await?;

        let created: Created = Self::decode("create", Self::check("create", response).await?).await?;
        let id = match created.id {
            Value::String(id) if !id.is_empty() => id,
            Value::Number(n) => n.to_string(),
            _ => return Err(JournalError::remote("create", "response carries no id")),
        };

        info!(journal_id = %id, "Journal stored through API");
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<Journal>, JournalError> {
        let url = self.journals_url(Some(id))?;
        let response = self.request(Method::GET, url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(journal_id = %id, "Journal not found through API");
            return Ok(None);
        }

        let doc: JournalDocument = Self::decode("get", Self::check("get", response).await?).await?;
        from_document(&doc).map(Some)
    }

    async fn list(&self) -> Result<Vec<JournalSummary>, JournalError> {
        let url = self.journals_url(None)?;
        let response = self.request(Method::GET, url).send().await?;
        let rows: Vec<JournalRow> = Self::decode("list", Self::check("list", response).await?).await?;

        Ok(rows
            .iter()
            .filter_map(|row| match summary_from_row(row) {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!(journal_id = ?row.id, error = %e, "Skipping malformed journal row");
                    None
                }
            })
            .collect())
    }

    async fn update(&self, id: &str, journal: &Journal) -> Result<(), JournalError> {
        let url = self.journals_url(Some(id))?;
        let mut doc = to_document(journal);
        doc.journal.id = None;
        doc.journal.created_at = None;

        let response = self.request(Method::PUT, url).json(&doc).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(JournalError::NotFound { id: id.to_string() });
        }
        Self::expect_success("update", response).await
    }

    async fn delete(&self, id: &str) -> Result<(), JournalError> {
        let url = self.journals_url(Some(id))?;
        let response = self.request(Method::DELETE, url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(JournalError::NotFound { id: id.to_string() });
        }
        Self::expect_success("delete", response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journals_url() {
        let gateway = ApiGateway::new(
            Url::parse("http://localhost:8080/api/").unwrap(),
            Duration::from_secs(1),
        )
        .unwrap();

        assert_eq!(
            gateway.journals_url(None).unwrap().as_str(),
            "http://localhost:8080/api/journals"
        );
        assert_eq!(
            gateway.journals_url(Some("a b")).unwrap().as_str(),
            "http://localhost:8080/api/journals/a%20b"
        );
    }
}
