//! Settings file and connection secrets

use crate::error::JournalError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment variable holding the remote store URL.
pub const STORE_URL_VAR: &str = "DUTYLOG_STORE_URL";
/// Environment variable holding the remote store access key.
pub const STORE_KEY_VAR: &str = "DUTYLOG_STORE_KEY";
/// Environment variable naming a settings file.
pub const CONFIG_PATH_VAR: &str = "DUTYLOG_CONFIG";

/// Which kind of remote store the gateway talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Three relational tables behind a PostgREST-style HTTP service
    #[default]
    Tables,
    /// The `/journals` intermediary API (see `dutylog serve`)
    Api,
    /// In-process tables, lost on exit
    Memory,
}

/// Connectivity probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    pub endpoints: Vec<Url>,
    pub timeout_ms: u64,
}

impl ProbeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        let endpoints = ["https://www.google.com", "https://www.cloudflare.com"]
            .into_iter()
            .filter_map(|u| Url::parse(u).ok())
            .collect();

        Self {
            endpoints,
            timeout_ms: 3_000,
        }
    }
}

/// Non-secret settings. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub backend: Backend,
    pub local_db_path: PathBuf,
    pub probe: ProbeSettings,
    pub request_timeout_ms: u64,
    pub bind_address: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            local_db_path: PathBuf::from("dutylog.sqlite3"),
            probe: ProbeSettings::default(),
            request_timeout_ms: 10_000,
            bind_address: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from a JSON file.
    pub fn load_from_file(path: &Path) -> Result<Self, JournalError> {
        let content = fs::read_to_string(path).map_err(|e| JournalError::Config {
            message: format!("cannot read {}: {e}", path.display()),
        })?;

        serde_json::from_str(&content).map_err(|e| JournalError::Config {
            message: format!("cannot parse {}: {e}", path.display()),
        })
    }

    /// Loads `path` if given, else the file named by `DUTYLOG_CONFIG`, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, JournalError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => match std::env::var_os(CONFIG_PATH_VAR) {
                Some(path) => Self::load_from_file(Path::new(&path)),
                None => Ok(Self::default()),
            },
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Remote store URL and access key.
#[derive(Clone)]
pub struct StoreSecrets {
    pub url: Url,
    pub key: String,
}

impl StoreSecrets {
    /// Reads both secrets from the process environment.
    pub fn from_env() -> Result<Self, JournalError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads both secrets through `lookup`. A missing or blank value is a
    /// configuration error naming the variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, JournalError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| JournalError::Config {
                    message: format!("{name} is not set"),
                })
        };

        let url = read(STORE_URL_VAR)?;
        let key = read(STORE_KEY_VAR)?;
        let url = Url::parse(&url)?;

        Ok(Self { url, key })
    }

    /// Short SHA-256 fingerprint of the key, safe to log.
    pub fn key_fingerprint(&self) -> String {
        let digest = Sha256::digest(self.key.as_bytes());
        digest[..4].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for StoreSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSecrets")
            .field("url", &self.url.as_str())
            .field("key", &format_args!("sha256:{}", self.key_fingerprint()))
            .finish()
    }
}
