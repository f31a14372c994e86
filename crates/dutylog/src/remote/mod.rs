//! Remote store gateway.
//!
//! [`RemoteStore`] is what the reconciliation layer and the HTTP server talk
//! to. Two implementations exist:
//!
//! * [`TableGateway`] sequences row-level writes over any [`Tables`] backend
//!   ([`RestTables`] or [`MemoryTables`]) and undoes partial writes itself,
//!   since the tables offer no multi-statement transaction.
//! * [`ApiGateway`] speaks the `/journals` intermediary API, which does the
//!   sequencing on the far side.

mod api;
mod memory;
mod rest;

pub use api::ApiGateway;
pub use memory::{MemoryTables, TableOp};
pub use rest::{RestConfig, RestTables};

use crate::config::{Backend, Settings, StoreSecrets};
use crate::error::JournalError;
use crate::journal::assemble::relational::{
    from_rows, summary_from_row, to_checklist_row, to_journal_row, to_period_rows,
};
use crate::journal::assemble::{ChecklistRow, JournalRow, PeriodRow};
use crate::journal::{Journal, JournalSummary};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Builds the remote store `settings` select, reading secrets from the
/// environment. Fails with a configuration error when they are missing.
pub fn connect(settings: &Settings) -> Result<Arc<dyn RemoteStore>, JournalError> {
    match settings.backend {
        Backend::Memory => Ok(Arc::new(TableGateway::new(Arc::new(MemoryTables::new())))),
        Backend::Tables => {
            let secrets = StoreSecrets::from_env()?;
            let config = RestConfig {
                request_timeout: settings.request_timeout(),
                ..Default::default()
            };
            let tables = RestTables::with_config(&secrets, config)?;
            Ok(Arc::new(TableGateway::new(Arc::new(tables))))
        }
        Backend::Api => {
            let secrets = StoreSecrets::from_env()?;
            Ok(Arc::new(ApiGateway::from_secrets(
                &secrets,
                settings.request_timeout(),
            )?))
        }
    }
}

/// Journal-level CRUD against the remote store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Stores a journal with its periods and checklist; returns the new id.
    async fn create(&self, journal: &Journal) -> Result<String, JournalError>;

    /// Fetches a journal with periods ordered by number and a checklist
    /// defaulted to all-unchecked when absent.
    async fn get(&self, id: &str) -> Result<Option<Journal>, JournalError>;

    /// Lists journal headers, newest date first.
    async fn list(&self) -> Result<Vec<JournalSummary>, JournalError>;

    /// Overwrites the header, replaces all periods and updates the checklist.
    async fn update(&self, id: &str, journal: &Journal) -> Result<(), JournalError>;

    /// Deletes the journal together with its periods and checklist.
    async fn delete(&self, id: &str) -> Result<(), JournalError>;
}

/// Row-level access to the `journals`, `periods` and `checklists` tables.
#[async_trait]
pub trait Tables: Send + Sync {
    /// Inserts a header and returns it as stored, with its assigned id.
    async fn insert_journal(&self, row: &JournalRow) -> Result<JournalRow, JournalError>;
    /// All headers, ordered by date descending.
    async fn select_journals(&self) -> Result<Vec<JournalRow>, JournalError>;
    async fn select_journal(&self, id: &str) -> Result<Option<JournalRow>, JournalError>;
    /// Returns false when no header has this id.
    async fn update_journal(&self, id: &str, row: &JournalRow) -> Result<bool, JournalError>;
    /// Returns false when no header has this id.
    async fn delete_journal(&self, id: &str) -> Result<bool, JournalError>;

    async fn insert_periods(&self, rows: &[PeriodRow]) -> Result<(), JournalError>;
    /// Periods of one journal, ordered by period number ascending.
    async fn select_periods(&self, journal_id: &str) -> Result<Vec<PeriodRow>, JournalError>;
    async fn delete_periods(&self, journal_id: &str) -> Result<(), JournalError>;

    async fn insert_checklist(&self, row: &ChecklistRow) -> Result<(), JournalError>;
    async fn select_checklist(&self, journal_id: &str)
        -> Result<Option<ChecklistRow>, JournalError>;
    /// Returns false when the journal has no checklist row.
    async fn update_checklist(
        &self,
        journal_id: &str,
        row: &ChecklistRow,
    ) -> Result<bool, JournalError>;
    async fn delete_checklist(&self, journal_id: &str) -> Result<(), JournalError>;
}

/// A [`RemoteStore`] built from row-level table operations.
pub struct TableGateway<T: Tables> {
    tables: Arc<T>,
}

impl<T: Tables> TableGateway<T> {
    pub fn new(tables: Arc<T>) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &Arc<T> {
        &self.tables
    }

    async fn insert_children(&self, journal: &Journal, journal_id: &str) -> Result<(), JournalError> {
        let periods = to_period_rows(journal, journal_id);
        if !periods.is_empty() {
            self.tables.insert_periods(&periods).await?;
        }
        self.tables
            .insert_checklist(&to_checklist_row(journal, journal_id))
            .await
    }

    async fn replace_children(&self, journal: &Journal, journal_id: &str) -> Result<(), JournalError> {
        self.tables.delete_periods(journal_id).await?;

        let periods = to_period_rows(journal, journal_id);
        if !periods.is_empty() {
            self.tables.insert_periods(&periods).await?;
        }

        let checklist = to_checklist_row(journal, journal_id);
        if !self.tables.update_checklist(journal_id, &checklist).await? {
            debug!(journal_id = %journal_id, "No checklist row to update, inserting one");
            self.tables.insert_checklist(&checklist).await?;
        }
        Ok(())
    }

    /// Undoes a partially created journal. Failures are logged; the caller
    /// still reports the original error.
    async fn compensate_create(&self, journal_id: &str) {
        if let Err(e) = self.tables.delete_periods(journal_id).await {
            error!(journal_id = %journal_id, error = %e, "Compensating delete of periods failed");
        }
        if let Err(e) = self.tables.delete_checklist(journal_id).await {
            error!(journal_id = %journal_id, error = %e, "Compensating delete of checklist failed");
        }
        match self.tables.delete_journal(journal_id).await {
            Ok(_) => info!(journal_id = %journal_id, "Rolled back partially created journal"),
            Err(e) => error!(
                journal_id = %journal_id,
                error = %e,
                "Compensating delete of journal header failed, header left behind"
            ),
        }
    }

    /// Puts back the header and periods captured before a failed update.
    async fn restore(&self, journal_id: &str, header: &JournalRow, periods: &[PeriodRow]) {
        let result = async {
            self.tables.update_journal(journal_id, header).await?;
            self.tables.delete_periods(journal_id).await?;
            if !periods.is_empty() {
                self.tables.insert_periods(periods).await?;
            }
            Ok::<_, JournalError>(())
        }
        .await;

        match result {
            Ok(()) => info!(journal_id = %journal_id, "Restored journal after failed update"),
            Err(e) => error!(
                journal_id = %journal_id,
                error = %e,
                "Restoring journal after failed update also failed"
            ),
        }
    }
}

#[async_trait]
impl<T: Tables> RemoteStore for TableGateway<T> {
    async fn create(&self, journal: &Journal) -> Result<String, JournalError> {
        let inserted = self.tables.insert_journal(&to_journal_row(journal)).await?;
        let journal_id = inserted
            .id
            .ok_or_else(|| JournalError::remote("insert journals", "inserted row carries no id"))?;

        if let Err(e) = self.insert_children(journal, &journal_id).await {
            warn!(journal_id = %journal_id, error = %e, "Journal created without children, rolling back");
            self.compensate_create(&journal_id).await;
            return Err(e);
        }

        info!(journal_id = %journal_id, periods = journal.periods.len(), "Journal stored remotely");
        Ok(journal_id)
    }

    async fn get(&self, id: &str) -> Result<Option<Journal>, JournalError> {
        let Some(row) = self.tables.select_journal(id).await? else {
            return Ok(None);
        };
        let periods = self.tables.select_periods(id).await?;
        let checklist = self.tables.select_checklist(id).await?;

        from_rows(&row, &periods, checklist.as_ref()).map(Some)
    }

    async fn list(&self) -> Result<Vec<JournalSummary>, JournalError> {
        let rows = self.tables.select_journals().await?;
        let mut summaries: Vec<JournalSummary> = rows
            .iter()
            .filter_map(|row| match summary_from_row(row) {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!(journal_id = ?row.id, error = %e, "Skipping malformed journal row");
                    None
                }
            })
            .collect();

        summaries.sort_by(|a, b| b.header.date.cmp(&a.header.date));
        Ok(summaries)
    }

    async fn update(&self, id: &str, journal: &Journal) -> Result<(), JournalError> {
        let mut previous = self
            .tables
            .select_journal(id)
            .await?
            .ok_or_else(|| JournalError::NotFound { id: id.to_string() })?;
        previous.id = None;
        previous.created_at = None;
        let previous_periods = self.tables.select_periods(id).await?;

        if !self.tables.update_journal(id, &to_journal_row(journal)).await? {
            return Err(JournalError::NotFound { id: id.to_string() });
        }

        if let Err(e) = self.replace_children(journal, id).await {
            warn!(journal_id = %id, error = %e, "Journal update failed part-way, restoring");
            self.restore(id, &previous, &previous_periods).await;
            return Err(e);
        }

        info!(journal_id = %id, "Journal updated remotely");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), JournalError> {
        self.tables.delete_periods(id).await?;
        self.tables.delete_checklist(id).await?;

        if !self.tables.delete_journal(id).await? {
            return Err(JournalError::NotFound { id: id.to_string() });
        }

        info!(journal_id = %id, "Journal deleted remotely");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{ClassCode, JournalHeader, Period, RecordRef};
    use chrono::NaiveDate;

    fn gateway() -> (TableGateway<MemoryTables>, Arc<MemoryTables>) {
        let tables = Arc::new(MemoryTables::new());
        (TableGateway::new(tables.clone()), tables)
    }

    fn journal(date: (i32, u32, u32), subjects: &[(u8, &str)]) -> Journal {
        let header = JournalHeader::new(
            NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            ClassCode::Year1A,
        );
        let mut journal = Journal::new(header);
        journal.periods = subjects
            .iter()
            .map(|(number, subject)| Period {
                number: *number,
                subject: subject.to_string(),
                ..Default::default()
            })
            .collect();
        journal
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let (gateway, _) = gateway();
        let mut input = journal((2025, 4, 15), &[(2, "Law"), (1, "Anatomy")]);
        input.checklist.set("mic", true);
        input.normalize();

        let id = gateway.create(&input).await.unwrap();
        let stored = gateway.get(&id).await.unwrap().unwrap();

        assert_eq!(stored.id, Some(RecordRef::Remote(id)));
        assert!(stored.created_at.is_some());
        assert_eq!(stored.header, input.header);
        assert_eq!(stored.periods, input.periods);
        assert_eq!(stored.checklist, input.checklist);
    }

    #[tokio::test]
    async fn test_create_rolls_back_when_periods_fail() {
        let (gateway, tables) = gateway();
        tables.fail(TableOp::InsertPeriods);

        let result = gateway.create(&journal((2025, 4, 15), &[(1, "Anatomy")])).await;

        assert!(matches!(result, Err(JournalError::Remote { .. })));
        assert_eq!(tables.journal_count(), 0);
        assert!(tables.select_journals().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rolls_back_when_checklist_fails() {
        let (gateway, tables) = gateway();
        tables.fail(TableOp::InsertChecklist);

        let result = gateway.create(&journal((2025, 4, 15), &[(1, "Anatomy")])).await;

        assert!(result.is_err());
        assert_eq!(tables.journal_count(), 0);
        assert_eq!(tables.period_count(), 0);
    }

    #[tokio::test]
    async fn test_update_replaces_periods() {
        let (gateway, _) = gateway();
        let id = gateway
            .create(&journal((2025, 4, 15), &[(1, "Anatomy"), (2, "Law")]))
            .await
            .unwrap();

        let mut edited = journal((2025, 4, 15), &[(4, "Ethics")]);
        edited.header.daily_comment = "edited".to_string();
        gateway.update(&id, &edited).await.unwrap();

        let stored = gateway.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.header.daily_comment, "edited");
        assert_eq!(stored.periods.len(), 1);
        assert_eq!(stored.periods[0].number, 4);
    }

    #[tokio::test]
    async fn test_failed_update_restores_previous_state() {
        let (gateway, tables) = gateway();
        let original = journal((2025, 4, 15), &[(1, "Anatomy")]);
        let id = gateway.create(&original).await.unwrap();

        tables.fail_once(TableOp::InsertPeriods);
        let mut edited = journal((2025, 4, 15), &[(3, "Ethics")]);
        edited.header.daily_comment = "edited".to_string();
        assert!(gateway.update(&id, &edited).await.is_err());

        let stored = gateway.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.header.daily_comment, "");
        assert_eq!(stored.periods.len(), 1);
        assert_eq!(stored.periods[0].subject, "Anatomy");
    }

    #[tokio::test]
    async fn test_update_inserts_missing_checklist() {
        let (gateway, tables) = gateway();
        let id = gateway.create(&journal((2025, 4, 15), &[])).await.unwrap();
        tables.delete_checklist(&id).await.unwrap();

        let mut edited = journal((2025, 4, 15), &[]);
        edited.checklist.set("prints", true);
        gateway.update(&id, &edited).await.unwrap();

        let checklist = tables.select_checklist(&id).await.unwrap().unwrap();
        assert_eq!(checklist.items.get("prints"), Some(&true));
    }

    #[tokio::test]
    async fn test_delete_aborts_when_children_fail() {
        let (gateway, tables) = gateway();
        let id = gateway
            .create(&journal((2025, 4, 15), &[(1, "Anatomy")]))
            .await
            .unwrap();

        tables.fail_once(TableOp::DeletePeriods);
        assert!(gateway.delete(&id).await.is_err());
        assert!(!tables.calls().contains(&TableOp::DeleteJournal));
        assert!(gateway.get(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_missing_journal_is_not_found() {
        let (gateway, _) = gateway();
        let result = gateway.update("404", &journal((2025, 4, 15), &[])).await;
        assert_eq!(
            result,
            Err(JournalError::NotFound {
                id: "404".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let (gateway, tables) = gateway();
        let id = gateway
            .create(&journal((2025, 4, 15), &[(1, "Anatomy"), (3, "Law")]))
            .await
            .unwrap();
        let kept = gateway
            .create(&journal((2025, 4, 16), &[(1, "Ethics")]))
            .await
            .unwrap();

        gateway.delete(&id).await.unwrap();

        assert!(gateway.get(&id).await.unwrap().is_none());
        assert!(tables.select_periods(&id).await.unwrap().is_empty());
        assert!(tables.select_checklist(&id).await.unwrap().is_none());
        assert_eq!(tables.period_count(), 1);
        assert!(gateway.get(&kept).await.unwrap().is_some());
        assert!(matches!(
            gateway.delete(&id).await,
            Err(JournalError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_orders_by_date_desc() {
        let (gateway, _) = gateway();
        for day in [14, 16, 15] {
            gateway.create(&journal((2025, 4, day), &[])).await.unwrap();
        }

        let days: Vec<u32> = gateway
            .list()
            .await
            .unwrap()
            .iter()
            .map(|s| chrono::Datelike::day(&s.header.date))
            .collect();
        assert_eq!(days, vec![16, 15, 14]);
    }
}
