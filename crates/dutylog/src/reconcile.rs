//! Per-operation routing between the remote store and the local fallback.
//!
//! Creates go remote when the store is configured and the network answers,
//! and fall back to the local store on any remote failure. Reads merge both
//! sides. Single-record operations are routed by the [`RecordRef`] variant, so
//! a local id never reaches the remote store and vice versa.

use crate::config::Settings;
use crate::error::JournalError;
use crate::journal::assemble::local::{from_local, summary_from_local, to_local};
use crate::journal::{Journal, JournalSummary, RecordRef};
use crate::local::LocalStore;
use crate::probe::{Connectivity, HttpProbe};
use crate::remote::{self, RemoteStore};
use rand::Rng;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Short random id tying together the log lines of one operation.
pub fn generate_correlation_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros();
    let random: u32 = rand::thread_rng().gen();
    format!("{:x}-{:08x}", timestamp & 0xFFFFFFFF, random)
}

/// The remote store, or the reason there is none.
pub enum RemoteBinding {
    Configured(Arc<dyn RemoteStore>),
    Unconfigured(JournalError),
}

/// Where a create should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMode {
    /// Remote when possible, local otherwise
    #[default]
    Auto,
    /// Local only, without probing
    Offline,
}

/// Result of a merged read-all.
#[derive(Debug)]
pub struct Listing {
    pub journals: Vec<JournalSummary>,
    /// Set when the remote side could not be read; `journals` then holds only
    /// local records.
    pub degraded: Option<JournalError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Online,
    Offline,
    ConfigError { message: String },
}

/// Outcome of pushing local records to the remote store.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Local id and the remote id it was stored under
    pub pushed: Vec<(RecordRef, String)>,
    /// Records left in the local store
    pub failed: Vec<(RecordRef, JournalError)>,
    /// Records stored remotely that could neither be removed locally nor
    /// withdrawn remotely: local id, remote id and the removal error
    pub duplicated: Vec<(RecordRef, String, JournalError)>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.duplicated.is_empty()
    }
}

pub struct Reconciler {
    remote: RemoteBinding,
    local: Arc<LocalStore>,
    probe: Arc<dyn Connectivity>,
}

impl Reconciler {
    pub fn new(remote: RemoteBinding, local: Arc<LocalStore>, probe: Arc<dyn Connectivity>) -> Self {
        Self {
            remote,
            local,
            probe,
        }
    }

    /// Wires up the configured backend, the local store file and the HTTP
    /// probe. A missing remote configuration is not an error here; it is
    /// reported per operation.
    pub fn from_settings(settings: &Settings) -> Result<Self, JournalError> {
        let remote = match remote::connect(settings) {
            Ok(remote) => RemoteBinding::Configured(remote),
            Err(e) => {
                warn!(error = %e, "Remote store unavailable, working locally");
                RemoteBinding::Unconfigured(e)
            }
        };
        let local = Arc::new(LocalStore::open(&settings.local_db_path)?);
        let probe = Arc::new(HttpProbe::new(&settings.probe)?);

        Ok(Self::new(remote, local, probe))
    }

    fn remote(&self) -> Result<&Arc<dyn RemoteStore>, JournalError> {
        match &self.remote {
            RemoteBinding::Configured(remote) => Ok(remote),
            RemoteBinding::Unconfigured(e) => Err(e.clone()),
        }
    }

    fn save_local(&self, journal: &Journal, correlation_id: &str) -> Result<RecordRef, JournalError> {
        let id = self.local.append(to_local(journal))?;
        info!(
            correlation_id = %correlation_id,
            journal_id = %id,
            "Journal saved to local store"
        );
        Ok(id)
    }

    /// Stores a new journal. The id variant tells where it went.
    pub async fn create(&self, journal: &Journal, mode: SaveMode) -> Result<RecordRef, JournalError> {
        let correlation_id = generate_correlation_id();

        let mut journal = journal.clone();
        journal.id = None;
        journal.created_at = None;
        journal.is_offline = false;
        journal.normalize();
        journal.validate()?;

        info!(
            correlation_id = %correlation_id,
            operation = "create",
            date = %journal.header.date,
            class = %journal.header.class,
            "Creating journal"
        );

        if mode == SaveMode::Offline {
            return self.save_local(&journal, &correlation_id);
        }

        let remote = match self.remote() {
            Ok(remote) => remote,
            Err(e) => {
                warn!(correlation_id = %correlation_id, error = %e, "Remote store not configured");
                return self.save_local(&journal, &correlation_id);
            }
        };

        if !self.probe.is_online().await {
            info!(correlation_id = %correlation_id, "Offline, skipping remote store");
            return self.save_local(&journal, &correlation_id);
        }

        match remote.create(&journal).await {
            Ok(id) => {
                info!(correlation_id = %correlation_id, journal_id = %id, "Journal saved remotely");
                Ok(RecordRef::Remote(id))
            }
            Err(e) => {
                if e.is_fallback_eligible() {
                    warn!(
                        correlation_id = %correlation_id,
                        error = %e,
                        "Remote create failed, falling back to local store"
                    );
                } else {
                    error!(
                        correlation_id = %correlation_id,
                        error = %e,
                        kind = ?e.kind(),
                        "Unexpected error from remote store, falling back to local store"
                    );
                }
                self.save_local(&journal, &correlation_id)
            }
        }
    }

    /// Local records only, newest first. Needs no network.
    pub fn list_local(&self) -> Result<Vec<JournalSummary>, JournalError> {
        let records = self.local.list()?;
        let mut summaries: Vec<JournalSummary> = records
            .iter()
            .filter_map(|record| match summary_from_local(record) {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!(journal_id = ?record.id(), error = %e, "Skipping malformed local record");
                    None
                }
            })
            .collect();
        sort_newest_first(&mut summaries);
        Ok(summaries)
    }

    /// Remote and local journals merged, or local ones alone when the remote
    /// store cannot be read.
    pub async fn list(&self) -> Result<Listing, JournalError> {
        let correlation_id = generate_correlation_id();
        let local = self.list_local()?;

        let remote = match self.remote() {
            Ok(remote) => remote,
            Err(e) => {
                return Ok(Listing {
                    journals: local,
                    degraded: Some(e),
                })
            }
        };

        match remote.list().await {
            Ok(remote) if !remote.is_empty() => {
                debug!(
                    correlation_id = %correlation_id,
                    remote = remote.len(),
                    local = local.len(),
                    "Merging journal listings"
                );
                Ok(Listing {
                    journals: merge_listings(remote, local),
                    degraded: None,
                })
            }
            Ok(_) => Ok(Listing {
                journals: local,
                degraded: None,
            }),
            Err(e) => {
                warn!(
                    correlation_id = %correlation_id,
                    error = %e,
                    "Remote listing failed, showing local journals only"
                );
                Ok(Listing {
                    journals: local,
                    degraded: Some(e),
                })
            }
        }
    }

    pub async fn get(&self, id: &RecordRef) -> Result<Option<Journal>, JournalError> {
        match id {
            RecordRef::Local(raw) => self.local.get(raw)?.as_ref().map(from_local).transpose(),
            RecordRef::Remote(raw) => self.remote()?.get(raw).await,
        }
    }

    /// Replaces the stored journal under `id`.
    pub async fn update(&self, id: &RecordRef, journal: &Journal) -> Result<(), JournalError> {
        let correlation_id = generate_correlation_id();

        let mut journal = journal.clone();
        journal.id = None;
        journal.created_at = None;
        journal.normalize();
        journal.validate()?;

        info!(
            correlation_id = %correlation_id,
            operation = "update",
            journal_id = %id,
            "Updating journal"
        );

        match id {
            RecordRef::Local(raw) => {
                if self.local.update(raw, to_local(&journal))? {
                    Ok(())
                } else {
                    Err(JournalError::NotFound { id: raw.clone() })
                }
            }
            RecordRef::Remote(raw) => self.remote()?.update(raw, &journal).await,
        }
    }

    pub async fn delete(&self, id: &RecordRef) -> Result<(), JournalError> {
        let correlation_id = generate_correlation_id();
        info!(
            correlation_id = %correlation_id,
            operation = "delete",
            journal_id = %id,
            "Deleting journal"
        );

        match id {
            RecordRef::Local(raw) => {
                if self.local.remove(raw)? {
                    Ok(())
                } else {
                    Err(JournalError::NotFound { id: raw.clone() })
                }
            }
            RecordRef::Remote(raw) => self.remote()?.delete(raw).await,
        }
    }

    /// Creates every local record remotely, removing each one locally once it
    /// is stored. Records that fail stay where they are.
    pub async fn push_offline(&self) -> Result<SyncReport, JournalError> {
        let correlation_id = generate_correlation_id();
        let remote = self.remote()?;

        if !self.probe.is_online().await {
            return Err(JournalError::Connectivity {
                message: "no network connection".to_string(),
            });
        }

        let mut report = SyncReport::default();
        for record in self.local.list()? {
            let Some(local_id) = record.id().map(RecordRef::parse) else {
                warn!(correlation_id = %correlation_id, "Local record without id left in place");
                continue;
            };

            let pushed = async {
                let mut journal = from_local(&record)?;
                journal.id = None;
                journal.created_at = None;
                journal.is_offline = false;
                journal.validate()?;
                remote.create(&journal).await
            }
            .await;

            match pushed {
                Ok(remote_id) => match self.local.remove(local_id.as_str()) {
                    Ok(removed) => {
                        if !removed {
                            warn!(
                                correlation_id = %correlation_id,
                                local_id = %local_id,
                                "Offline journal vanished from local store during sync"
                            );
                        }
                        info!(
                            correlation_id = %correlation_id,
                            journal_id = %remote_id,
                            local_id = %local_id,
                            "Offline journal pushed"
                        );
                        report.pushed.push((local_id, remote_id));
                    }
                    Err(e) => {
                        error!(
                            correlation_id = %correlation_id,
                            journal_id = %remote_id,
                            local_id = %local_id,
                            error = %e,
                            "Local removal failed, withdrawing remote copy"
                        );
                        match remote.delete(&remote_id).await {
                            Ok(()) => report.failed.push((local_id, e)),
                            Err(withdraw) => {
                                error!(
                                    correlation_id = %correlation_id,
                                    journal_id = %remote_id,
                                    local_id = %local_id,
                                    error = %withdraw,
                                    "Remote copy could not be withdrawn, journal is now in both stores"
                                );
                                report.duplicated.push((local_id, remote_id, e));
                            }
                        }
                    }
                },
                Err(e) => {
                    warn!(
                        correlation_id = %correlation_id,
                        local_id = %local_id,
                        error = %e,
                        "Offline journal could not be pushed"
                    );
                    report.failed.push((local_id, e));
                }
            }
        }

        Ok(report)
    }

    pub async fn connection_status(&self) -> ConnectionStatus {
        if !self.probe.is_online().await {
            return ConnectionStatus::Offline;
        }
        match &self.remote {
            RemoteBinding::Configured(_) => ConnectionStatus::Online,
            RemoteBinding::Unconfigured(e) => ConnectionStatus::ConfigError {
                message: e.to_string(),
            },
        }
    }
}

fn sort_newest_first(journals: &mut [JournalSummary]) {
    journals.sort_by(|a, b| {
        b.header
            .date
            .cmp(&a.header.date)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

/// Union of both listings; a remote entry wins over a local one with the same id.
fn merge_listings(remote: Vec<JournalSummary>, local: Vec<JournalSummary>) -> Vec<JournalSummary> {
    let mut seen: HashSet<RecordRef> = remote.iter().map(|j| j.id.clone()).collect();
    let mut merged = remote;
    for journal in local {
        if seen.insert(journal.id.clone()) {
            merged.push(journal);
        }
    }
    sort_newest_first(&mut merged);
    merged
}
