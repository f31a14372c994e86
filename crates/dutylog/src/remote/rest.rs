//! Row access over a PostgREST-style HTTP service.
//!
//! Tables live under `{url}/rest/v1/{table}`. Every request carries the access
//! key both as `apikey` and as a bearer token, filters are `column=eq.value`
//! query pairs, and writes ask for the affected rows back.

use super::Tables;
use crate::config::StoreSecrets;
use crate::error::JournalError;
use crate::journal::assemble::{ChecklistRow, JournalRow, PeriodRow};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

const JOURNALS: &str = "journals";
const PERIODS: &str = "periods";
const CHECKLISTS: &str = "checklists";

/// Configuration for the table client.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Total time allowed per request
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

pub struct RestTables {
    client: Client,
    base: Url,
}

impl RestTables {
    pub fn new(secrets: &StoreSecrets) -> Result<Self, JournalError> {
        Self::with_config(secrets, RestConfig::default())
    }

    pub fn with_config(secrets: &StoreSecrets, config: RestConfig) -> Result<Self, JournalError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&secrets.key).map_err(|_| JournalError::Config {
            message: "store key contains characters not allowed in a header".to_string(),
        })?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", secrets.key)).map_err(|_| {
            JournalError::Config {
                message: "store key contains characters not allowed in a header".to_string(),
            }
        })?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| JournalError::Config {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        debug!(
            url = %secrets.url,
            key = %secrets.key_fingerprint(),
            "Remote table client ready"
        );

        Ok(Self {
            client,
            base: rest_base(&secrets.url)?,
        })
    }

    fn table_url(&self, table: &str, query: &[(&str, String)]) -> Result<Url, JournalError> {
        table_url(&self.base, table, query)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Sends the request and decodes the returned rows. Any non-2xx status is
    /// a remote failure carrying the status and response body.
    async fn rows<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Vec<T>, JournalError> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JournalError::Remote {
                operation,
                status: Some(status.as_u16()),
                message: if body.is_empty() {
                    format!("returned status {status}")
                } else {
                    body
                },
            });
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&body).map_err(|e| JournalError::Remote {
            operation,
            status: Some(status.as_u16()),
            message: format!("unexpected response body: {e}"),
        })
    }
}

/// `{url}/rest/v1/`, keeping any path prefix on the configured URL.
fn rest_base(url: &Url) -> Result<Url, JournalError> {
    let mut base = url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base.join("rest/v1/")?)
}

fn table_url(base: &Url, table: &str, query: &[(&str, String)]) -> Result<Url, JournalError> {
    let mut url = base.join(table)?;
    if !query.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
    }
    Ok(url)
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

#[async_trait]
impl Tables for RestTables {
    async fn insert_journal(&self, row: &JournalRow) -> Result<JournalRow, JournalError> {
        let url = self.table_url(JOURNALS, &[])?;
        let rows: Vec<JournalRow> = self
            .rows("insert journals", self.request(Method::POST, url).json(row))
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| JournalError::remote("insert journals", "no row returned"))
    }

    async fn select_journals(&self) -> Result<Vec<JournalRow>, JournalError> {
        let url = self.table_url(
            JOURNALS,
            &[
                ("select", "*".to_string()),
                ("order", "date.desc,created_at.desc".to_string()),
            ],
        )?;
        self.rows("select journals", self.request(Method::GET, url)).await
    }

    async fn select_journal(&self, id: &str) -> Result<Option<JournalRow>, JournalError> {
        let url = self.table_url(JOURNALS, &[("select", "*".to_string()), ("id", eq(id))])?;
        let rows: Vec<JournalRow> = self
            .rows("select journal", self.request(Method::GET, url))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn update_journal(&self, id: &str, row: &JournalRow) -> Result<bool, JournalError> {
        let url = self.table_url(JOURNALS, &[("id", eq(id))])?;
        let rows: Vec<Value> = self
            .rows("update journals", self.request(Method::PATCH, url).json(row))
            .await?;
        Ok(!rows.is_empty())
    }

    async fn delete_journal(&self, id: &str) -> Result<bool, JournalError> {
        let url = self.table_url(JOURNALS, &[("id", eq(id))])?;
        let rows: Vec<Value> = self
            .rows("delete journals", self.request(Method::DELETE, url))
            .await?;
        Ok(!rows.is_empty())
    }

    async fn insert_periods(&self, rows: &[PeriodRow]) -> Result<(), JournalError> {
        let url = self.table_url(PERIODS, &[])?;
        let _: Vec<Value> = self
            .rows("insert periods", self.request(Method::POST, url).json(rows))
            .await?;
        Ok(())
    }

    async fn select_periods(&self, journal_id: &str) -> Result<Vec<PeriodRow>, JournalError> {
        let url = self.table_url(
            PERIODS,
            &[
                ("select", "*".to_string()),
                ("journal_id", eq(journal_id)),
                ("order", "period_number.asc".to_string()),
            ],
        )?;
        self.rows("select periods", self.request(Method::GET, url)).await
    }

    async fn delete_periods(&self, journal_id: &str) -> Result<(), JournalError> {
        let url = self.table_url(PERIODS, &[("journal_id", eq(journal_id))])?;
        let _: Vec<Value> = self
            .rows("delete periods", self.request(Method::DELETE, url))
            .await?;
        Ok(())
    }

    async fn insert_checklist(&self, row: &ChecklistRow) -> Result<(), JournalError> {
        let url = self.table_url(CHECKLISTS, &[])?;
        let _: Vec<Value> = self
            .rows("insert checklists", self.request(Method::POST, url).json(row))
            .await?;
        Ok(())
    }

    async fn select_checklist(
        &self,
        journal_id: &str,
    ) -> Result<Option<ChecklistRow>, JournalError> {
        let url = self.table_url(
            CHECKLISTS,
            &[("select", "*".to_string()), ("journal_id", eq(journal_id))],
        )?;
        let rows: Vec<ChecklistRow> = self
            .rows("select checklists", self.request(Method::GET, url))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn update_checklist(
        &self,
        journal_id: &str,
        row: &ChecklistRow,
    ) -> Result<bool, JournalError> {
        let url = self.table_url(CHECKLISTS, &[("journal_id", eq(journal_id))])?;
        let rows: Vec<Value> = self
            .rows(
                "update checklists",
                self.request(Method::PATCH, url).json(&row.items),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn delete_checklist(&self, journal_id: &str) -> Result<(), JournalError> {
        let url = self.table_url(CHECKLISTS, &[("journal_id", eq(journal_id))])?;
        let _: Vec<Value> = self
            .rows("delete checklists", self.request(Method::DELETE, url))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets(url: &str) -> StoreSecrets {
        StoreSecrets {
            url: Url::parse(url).unwrap(),
            key: "anon-key".to_string(),
        }
    }

    #[test]
    fn test_rest_base_keeps_prefix() {
        let base = rest_base(&Url::parse("https://abc.supabase.co").unwrap()).unwrap();
        assert_eq!(base.as_str(), "https://abc.supabase.co/rest/v1/");

        let base = rest_base(&Url::parse("http://localhost:54321/proxy").unwrap()).unwrap();
        assert_eq!(base.as_str(), "http://localhost:54321/proxy/rest/v1/");
    }

    #[test]
    fn test_table_url_filters() {
        let base = rest_base(&Url::parse("https://abc.supabase.co/").unwrap()).unwrap();
        let url = table_url(
            &base,
            PERIODS,
            &[
                ("journal_id", eq("42")),
                ("order", "period_number.asc".to_string()),
            ],
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://abc.supabase.co/rest/v1/periods?journal_id=eq.42&order=period_number.asc"
        );
    }

    #[test]
    fn test_key_must_be_header_safe() {
        let mut bad = secrets("https://abc.supabase.co");
        bad.key = "line\nbreak".to_string();
        assert!(matches!(
            RestTables::new(&bad),
            Err(JournalError::Config { .. })
        ));
        assert!(RestTables::new(&secrets("https://abc.supabase.co")).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_store_is_connectivity_error() {
        let tables = RestTables::with_config(
            &secrets("http://127.0.0.1:9"),
            RestConfig {
                request_timeout: Duration::from_secs(2),
                connect_timeout: Duration::from_secs(1),
            },
        )
        .unwrap();

        let result = tables.select_journals().await;
        assert!(matches!(result, Err(JournalError::Connectivity { .. })));
    }
}
