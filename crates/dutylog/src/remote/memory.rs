//! In-process tables with failure injection, for offline use and tests

use super::Tables;
use crate::error::JournalError;
use crate::journal::assemble::{ChecklistRow, JournalRow, PeriodRow};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// A single table operation, as recorded and as targeted by injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableOp {
    InsertJournal,
    SelectJournals,
    SelectJournal,
    UpdateJournal,
    DeleteJournal,
    InsertPeriods,
    SelectPeriods,
    DeletePeriods,
    InsertChecklist,
    SelectChecklist,
    UpdateChecklist,
    DeleteChecklist,
}

/// The three journal tables held in memory. Mirrors the remote schema's
/// constraints: periods and checklists need an existing journal, and
/// `(journal_id, period_number, is_night)` is unique.
#[derive(Default)]
pub struct MemoryTables {
    next_id: AtomicU64,
    journals: DashMap<String, JournalRow>,
    periods: DashMap<String, Vec<PeriodRow>>,
    checklists: DashMap<String, ChecklistRow>,
    /// Remaining injected failures per operation
    failures: DashMap<TableOp, u32>,
    #[cfg(test)]
    calls: std::sync::Mutex<Vec<TableOp>>,
}

impl MemoryTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call of `op` fail.
    pub fn fail(&self, op: TableOp) {
        self.failures.insert(op, u32::MAX);
    }

    /// Makes only the next call of `op` fail.
    pub fn fail_once(&self, op: TableOp) {
        self.failures.insert(op, 1);
    }

    pub fn clear_failures(&self) {
        self.failures.clear();
    }

    /// Every operation attempted so far, in order.
    #[cfg(test)]
    pub fn calls(&self) -> Vec<TableOp> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn journal_count(&self) -> usize {
        self.journals.len()
    }

    pub fn period_count(&self) -> usize {
        self.periods.iter().map(|entry| entry.value().len()).sum()
    }

    #[cfg(test)]
    fn record(&self, op: TableOp) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(op);
        }
    }

    #[cfg(not(test))]
    fn record(&self, _op: TableOp) {}

    fn enter(&self, op: TableOp) -> Result<(), JournalError> {
        self.record(op);

        let mut injected = false;
        self.failures.remove_if_mut(&op, |_, remaining| {
            injected = true;
            if *remaining != u32::MAX {
                *remaining -= 1;
            }
            *remaining == 0
        });

        if injected {
            return Err(JournalError::Remote {
                operation: "memory",
                status: Some(503),
                message: format!("injected failure in {op:?}"),
            });
        }
        Ok(())
    }

    fn require_journal(&self, journal_id: &str) -> Result<(), JournalError> {
        if self.journals.contains_key(journal_id) {
            Ok(())
        } else {
            Err(JournalError::Remote {
                operation: "memory",
                status: Some(409),
                message: format!("journal {journal_id} does not exist"),
            })
        }
    }
}

#[async_trait]
impl Tables for MemoryTables {
    async fn insert_journal(&self, row: &JournalRow) -> Result<JournalRow, JournalError> {
        self.enter(TableOp::InsertJournal)?;

        let id = (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string();
        let mut stored = row.clone();
        stored.id = Some(id.clone());
        stored.created_at = Some(Utc::now().to_rfc3339());
        self.journals.insert(id, stored.clone());
        Ok(stored)
    }

    async fn select_journals(&self) -> Result<Vec<JournalRow>, JournalError> {
        self.enter(TableOp::SelectJournals)?;

        let mut rows: Vec<JournalRow> = self.journals.iter().map(|e| e.value().clone()).collect();
        rows.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(rows)
    }

    async fn select_journal(&self, id: &str) -> Result<Option<JournalRow>, JournalError> {
        self.enter(TableOp::SelectJournal)?;
        Ok(self.journals.get(id).map(|row| row.value().clone()))
    }

    async fn update_journal(&self, id: &str, row: &JournalRow) -> Result<bool, JournalError> {
        self.enter(TableOp::UpdateJournal)?;

        let Some(mut stored) = self.journals.get_mut(id) else {
            return Ok(false);
        };
        let created_at = stored.created_at.take();
        *stored = JournalRow {
            id: Some(id.to_string()),
            created_at,
            ..row.clone()
        };
        Ok(true)
    }

    async fn delete_journal(&self, id: &str) -> Result<bool, JournalError> {
        self.enter(TableOp::DeleteJournal)?;

        if self.periods.get(id).is_some_and(|p| !p.is_empty()) || self.checklists.contains_key(id) {
            return Err(JournalError::Remote {
                operation: "memory",
                status: Some(409),
                message: format!("journal {id} is still referenced"),
            });
        }
        Ok(self.journals.remove(id).is_some())
    }

    async fn insert_periods(&self, rows: &[PeriodRow]) -> Result<(), JournalError> {
        self.enter(TableOp::InsertPeriods)?;

        for (i, row) in rows.iter().enumerate() {
            self.require_journal(&row.journal_id)?;
            let same_slot = |p: &PeriodRow| {
                p.journal_id == row.journal_id
                    && p.period_number == row.period_number
                    && p.is_night == row.is_night
            };
            let clash = rows[..i].iter().any(same_slot)
                || self
                    .periods
                    .get(&row.journal_id)
                    .is_some_and(|existing| existing.iter().any(same_slot));
            if clash {
                return Err(JournalError::Remote {
                    operation: "memory",
                    status: Some(409),
                    message: format!(
                        "duplicate period {} for journal {}",
                        row.period_number, row.journal_id
                    ),
                });
            }
        }

        for row in rows {
            let mut stored = row.clone();
            stored.id = Some((self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string());
            self.periods
                .entry(row.journal_id.clone())
                .or_default()
                .push(stored);
        }
        Ok(())
    }

    async fn select_periods(&self, journal_id: &str) -> Result<Vec<PeriodRow>, JournalError> {
        self.enter(TableOp::SelectPeriods)?;

        let mut rows = self
            .periods
            .get(journal_id)
            .map(|p| p.value().clone())
            .unwrap_or_default();
        rows.sort_by_key(|p| (p.period_number, p.is_night));
        Ok(rows)
    }

    async fn delete_periods(&self, journal_id: &str) -> Result<(), JournalError> {
        self.enter(TableOp::DeletePeriods)?;
        self.periods.remove(journal_id);
        Ok(())
    }

    async fn insert_checklist(&self, row: &ChecklistRow) -> Result<(), JournalError> {
        self.enter(TableOp::InsertChecklist)?;
        self.require_journal(&row.journal_id)?;

        let mut stored = row.clone();
        stored.id = Some((self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string());
        self.checklists.insert(row.journal_id.clone(), stored);
        Ok(())
    }

    async fn select_checklist(
        &self,
        journal_id: &str,
    ) -> Result<Option<ChecklistRow>, JournalError> {
        self.enter(TableOp::SelectChecklist)?;
        Ok(self.checklists.get(journal_id).map(|row| row.value().clone()))
    }

    async fn update_checklist(
        &self,
        journal_id: &str,
        row: &ChecklistRow,
    ) -> Result<bool, JournalError> {
        self.enter(TableOp::UpdateChecklist)?;

        let Some(mut stored) = self.checklists.get_mut(journal_id) else {
            return Ok(false);
        };
        stored.items = row.items.clone();
        Ok(true)
    }

    async fn delete_checklist(&self, journal_id: &str) -> Result<(), JournalError> {
        self.enter(TableOp::DeleteChecklist)?;
        self.checklists.remove(journal_id);
        Ok(())
    }
}
