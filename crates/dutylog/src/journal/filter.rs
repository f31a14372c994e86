//! Narrowing a journal listing the way the list and print views do

use super::types::{ClassCode, JournalSummary, ShiftType};
use chrono::NaiveDate;
use serde::Deserialize;

/// Criteria for a listing. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JournalFilter {
    #[serde(default)]
    pub shift: Option<ShiftType>,
    #[serde(default)]
    pub class: Option<ClassCode>,
    /// Inclusive lower bound
    #[serde(default)]
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound
    #[serde(default)]
    pub to: Option<NaiveDate>,
    /// Case-insensitive match on the date, duty reps or class name
    #[serde(default)]
    pub search: Option<String>,
}

impl JournalFilter {
    pub fn is_empty(&self) -> bool {
        *self == JournalFilter::default()
    }

    pub fn matches(&self, journal: &JournalSummary) -> bool {
        let h = &journal.header;

        if self.shift.is_some_and(|s| s != h.shift) {
            return false;
        }
        if self.class.is_some_and(|c| c != h.class) {
            return false;
        }
        if self.from.is_some_and(|from| h.date < from) {
            return false;
        }
        if self.to.is_some_and(|to| h.date > to) {
            return false;
        }

        match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(term) => {
                let term = term.to_lowercase();
                h.date.format("%Y-%m-%d").to_string().contains(&term)
                    || h.duty_reps.iter().any(|r| r.to_lowercase().contains(&term))
                    || h.class.display_name().to_lowercase().contains(&term)
                    || h.class.code() == term
            }
        }
    }

    /// Keeps matching entries, preserving order.
    pub fn apply(&self, journals: Vec<JournalSummary>) -> Vec<JournalSummary> {
        if self.is_empty() {
            return journals;
        }
        journals.into_iter().filter(|j| self.matches(j)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::types::{JournalHeader, RecordRef};

    fn summary(id: &str, date: (i32, u32, u32), class: ClassCode, rep: &str) -> JournalSummary {
        let mut header = JournalHeader::new(
            NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            class,
        );
        header.duty_reps = vec![rep.to_string()];
        JournalSummary {
            id: RecordRef::parse(id),
            created_at: None,
            is_offline: false,
            header,
        }
    }

    fn listing() -> Vec<JournalSummary> {
        vec![
            summary("3", (2025, 4, 17), ClassCode::Year1N, "Mori"),
            summary("2", (2025, 4, 16), ClassCode::Year2A, "Sato"),
            summary("1", (2025, 4, 10), ClassCode::Year1A, "Ito"),
        ]
    }

    fn ids(journals: &[JournalSummary]) -> Vec<&str> {
        journals.iter().map(|j| j.id.as_str()).collect()
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        assert_eq!(JournalFilter::default().apply(listing()).len(), 3);
    }

    #[test]
    fn test_shift_and_date_range() {
        let filter = JournalFilter {
            shift: Some(ShiftType::Day),
            from: NaiveDate::from_ymd_opt(2025, 4, 11),
            ..Default::default()
        };
        assert_eq!(ids(&filter.apply(listing())), vec!["2"]);
    }

    #[test]
    fn test_search_matches_rep_and_class_name() {
        let by_rep = JournalFilter {
            search: Some("sAtO".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&by_rep.apply(listing())), vec!["2"]);

        let by_class = JournalFilter {
            search: Some("1年".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&by_class.apply(listing())), vec!["3", "1"]);
    }
}
