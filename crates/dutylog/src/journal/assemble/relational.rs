//! Rows of the `journals`, `periods` and `checklists` tables.

use super::{de_flex_bool, de_id, de_opt_id, de_text, flex_bool, id_string, parse_timestamp, reps, RawHeader};
use crate::error::JournalError;
use crate::journal::types::{Checklist, Journal, JournalHeader, JournalSummary, Period, RecordRef};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A `journals` table row.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JournalRow {
    #[serde(default, deserialize_with = "de_opt_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "de_text")]
    pub date: String,
    #[serde(default, deserialize_with = "de_text")]
    pub weather: String,
    #[serde(default, deserialize_with = "de_text")]
    pub day_type: String,
    #[serde(default, deserialize_with = "de_text")]
    pub class_name: String,
    #[serde(default, deserialize_with = "de_text")]
    pub daily_rep_1: String,
    #[serde(default, deserialize_with = "de_text")]
    pub daily_rep_2: String,
    #[serde(default, deserialize_with = "de_text")]
    pub next_daily_rep_1: String,
    #[serde(default, deserialize_with = "de_text")]
    pub next_daily_rep_2: String,
    #[serde(default, deserialize_with = "de_text")]
    pub daily_comment: String,
    #[serde(default, deserialize_with = "de_text")]
    pub teacher_comment: String,
    #[serde(default, deserialize_with = "de_text")]
    pub substitute: String,
    #[serde(default, deserialize_with = "de_text")]
    pub current_cleaning_duty: String,
    #[serde(default, deserialize_with = "de_text")]
    pub next_cleaning_duty: String,
}

/// A `periods` table row.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PeriodRow {
    #[serde(default, deserialize_with = "de_opt_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "de_id")]
    pub journal_id: String,
    pub period_number: u8,
    #[serde(default, deserialize_with = "de_text")]
    pub subject: String,
    #[serde(default, deserialize_with = "de_text")]
    pub teacher: String,
    #[serde(default, deserialize_with = "de_text")]
    pub content: String,
    #[serde(default, deserialize_with = "de_text")]
    pub absences: String,
    #[serde(default, deserialize_with = "de_text")]
    pub in_out: String,
    #[serde(default, deserialize_with = "de_flex_bool")]
    pub is_night: bool,
}

/// A `checklists` table row. Every boolean-looking column is an item, so
/// columns added or dropped by schema revisions pass through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct ChecklistRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub journal_id: String,
    #[serde(flatten)]
    pub items: BTreeMap<String, bool>,
}

const CHECKLIST_META_COLUMNS: [&str; 4] = ["id", "journal_id", "created_at", "updated_at"];

impl TryFrom<Map<String, Value>> for ChecklistRow {
    type Error = String;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        let items = map
            .iter()
            .filter(|(key, _)| !CHECKLIST_META_COLUMNS.contains(&key.as_str()))
            .filter_map(|(key, value)| flex_bool(value).map(|b| (key.clone(), b)))
            .collect();

        Ok(ChecklistRow {
            id: map.get("id").and_then(id_string),
            journal_id: map.get("journal_id").and_then(id_string).unwrap_or_default(),
            items,
        })
    }
}

/// A journal row with its periods and checklist: the body of the
/// intermediary API's single-journal endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalDocument {
    #[serde(flatten)]
    pub journal: JournalRow,
    #[serde(default)]
    pub periods: Vec<PeriodRow>,
    #[serde(default)]
    pub checklist: Option<ChecklistRow>,
}

fn rep(names: &[String], index: usize) -> String {
    names.get(index).cloned().unwrap_or_default()
}

/// Header row for a journal. The id is left for the store to assign.
pub fn to_journal_row(journal: &Journal) -> JournalRow {
    header_row(&journal.header)
}

/// Header row for a listed journal, carrying its id and creation time.
pub fn summary_to_row(summary: &JournalSummary) -> JournalRow {
    let mut row = header_row(&summary.header);
    row.id = Some(summary.id.as_str().to_string());
    row.created_at = summary.created_at.map(|t| t.to_rfc3339());
    row
}

fn header_row(h: &JournalHeader) -> JournalRow {
    JournalRow {
        id: None,
        created_at: None,
        date: h.date.format("%Y-%m-%d").to_string(),
        weather: h.weather.as_str().to_string(),
        day_type: h.shift.as_str().to_string(),
        class_name: h.class.code().to_string(),
        daily_rep_1: rep(&h.duty_reps, 0),
        daily_rep_2: rep(&h.duty_reps, 1),
        next_daily_rep_1: rep(&h.next_duty_reps, 0),
        next_daily_rep_2: rep(&h.next_duty_reps, 1),
        daily_comment: h.daily_comment.clone(),
        teacher_comment: h.teacher_comment.clone(),
        substitute: h.substitute.clone(),
        current_cleaning_duty: h.current_cleaning_duty.clone(),
        next_cleaning_duty: h.next_cleaning_duty.clone(),
    }
}

/// Rows for every non-empty period, referencing `journal_id`.
pub fn to_period_rows(journal: &Journal, journal_id: &str) -> Vec<PeriodRow> {
    journal
        .periods
        .iter()
        .filter(|p| !p.is_empty())
        .map(|p| PeriodRow {
            id: None,
            journal_id: journal_id.to_string(),
            period_number: p.number,
            subject: p.subject.clone(),
            teacher: p.teacher.clone(),
            content: p.content.clone(),
            absences: p.absences.clone(),
            in_out: p.in_out.clone(),
            is_night: p.is_night,
        })
        .collect()
}

pub fn to_checklist_row(journal: &Journal, journal_id: &str) -> ChecklistRow {
    ChecklistRow {
        id: None,
        journal_id: journal_id.to_string(),
        items: journal.checklist.items().clone(),
    }
}

pub fn to_document(journal: &Journal) -> JournalDocument {
    let journal_id = journal
        .id
        .as_ref()
        .map(|id| id.as_str().to_string())
        .unwrap_or_default();

    let mut row = to_journal_row(journal);
    if !journal_id.is_empty() {
        row.id = Some(journal_id.clone());
    }
    row.created_at = journal.created_at.map(|t| t.to_rfc3339());

    JournalDocument {
        journal: row,
        periods: to_period_rows(journal, &journal_id),
        checklist: Some(to_checklist_row(journal, &journal_id)),
    }
}

fn header_of(row: &JournalRow) -> RawHeader<'_> {
    RawHeader {
        date: &row.date,
        weather: &row.weather,
        day_type: &row.day_type,
        class_name: &row.class_name,
        duty_reps: reps([row.daily_rep_1.as_str(), row.daily_rep_2.as_str()]),
        next_duty_reps: reps([row.next_daily_rep_1.as_str(), row.next_daily_rep_2.as_str()]),
        daily_comment: &row.daily_comment,
        teacher_comment: &row.teacher_comment,
        substitute: &row.substitute,
        current_cleaning_duty: &row.current_cleaning_duty,
        next_cleaning_duty: &row.next_cleaning_duty,
    }
}

/// Listing entry for a header row.
pub fn summary_from_row(row: &JournalRow) -> Result<JournalSummary, JournalError> {
    let id = row
        .id
        .as_deref()
        .ok_or_else(|| JournalError::invalid("journal row has no id"))?;

    Ok(JournalSummary {
        id: RecordRef::Remote(id.to_string()),
        created_at: row.created_at.as_deref().and_then(parse_timestamp),
        is_offline: false,
        header: header_of(row).into_header()?,
    })
}

fn period_from_row(row: &PeriodRow) -> Period {
    Period {
        number: row.period_number,
        is_night: row.is_night,
        subject: row.subject.clone(),
        teacher: row.teacher.clone(),
        content: row.content.clone(),
        absences: row.absences.clone(),
        in_out: row.in_out.clone(),
    }
}

/// Assembles a journal from its header, period rows and optional checklist row.
/// A missing checklist reads as all default keys unchecked. A row without an
/// id gives an unsaved journal.
pub fn from_rows(
    row: &JournalRow,
    periods: &[PeriodRow],
    checklist: Option<&ChecklistRow>,
) -> Result<Journal, JournalError> {
    let checklist = checklist
        .map(|c| Checklist::from_items(c.items.clone()))
        .unwrap_or_default();

    let mut journal = Journal {
        id: row.id.clone().map(RecordRef::Remote),
        created_at: row.created_at.as_deref().and_then(parse_timestamp),
        is_offline: false,
        header: header_of(row).into_header()?,
        periods: periods.iter().map(period_from_row).collect(),
        checklist,
    };
    journal.normalize();
    Ok(journal)
}

pub fn from_document(doc: &JournalDocument) -> Result<Journal, JournalError> {
    from_rows(&doc.journal, &doc.periods, doc.checklist.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::types::{ClassCode, ShiftType, Weather};
    use chrono::NaiveDate;
    use serde_json::json;

    fn sample() -> Journal {
        let mut header = JournalHeader::new(
            NaiveDate::from_ymd_opt(2025, 4, 15).unwrap(),
            ClassCode::Year1A,
        );
        header.duty_reps = vec!["Sato".to_string()];
        header.teacher_comment = "Good work".to_string();

        let mut journal = Journal::new(header);
        journal.id = Some(RecordRef::Remote("7".to_string()));
        journal.periods = vec![
            Period {
                number: 1,
                subject: "Anatomy".to_string(),
                ..Default::default()
            },
            Period {
                number: 3,
                teacher: "Tanaka".to_string(),
                ..Default::default()
            },
        ];
        journal.checklist.set("pc", true);
        journal
    }

    #[test]
    fn test_rows_round_trip() {
        let journal = sample();
        let mut row = to_journal_row(&journal);
        row.id = Some("7".to_string());
        let periods = to_period_rows(&journal, "7");
        let checklist = to_checklist_row(&journal, "7");

        let back = from_rows(&row, &periods, Some(&checklist)).unwrap();
        assert_eq!(back, journal);
    }

    #[test]
    fn test_row_decodes_string_booleans_and_numeric_ids() {
        let period: PeriodRow = serde_json::from_value(json!({
            "id": 11,
            "journal_id": 7,
            "period_number": 2,
            "subject": "Law",
            "teacher": null,
            "is_night": "true"
        }))
        .unwrap();
        assert!(period.is_night);
        assert_eq!(period.journal_id, "7");
        assert_eq!(period.teacher, "");

        let checklist: ChecklistRow = serde_json::from_value(json!({
            "id": "c1",
            "journal_id": "7",
            "pc": "true",
            "mic": false,
            "chalk": "false",
            "created_at": "2025-04-15T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(checklist.items.len(), 3);
        assert_eq!(checklist.items.get("pc"), Some(&true));
    }

    #[test]
    fn test_missing_checklist_defaults_to_unchecked() {
        let row: JournalRow = serde_json::from_value(json!({
            "id": "9",
            "date": "2025-04-16",
            "weather": "rainy",
            "day_type": "night",
            "class_name": "3n",
            "daily_rep_1": "",
            "daily_rep_2": "Ito"
        }))
        .unwrap();

        let journal = from_rows(&row, &[], None).unwrap();
        assert_eq!(journal.header.weather, Weather::Rainy);
        assert_eq!(journal.header.shift, ShiftType::Night);
        assert_eq!(journal.header.duty_reps, vec!["Ito"]);
        assert_eq!(journal.checklist, Checklist::with_defaults());
    }

    #[test]
    fn test_unsaved_document_has_no_id() {
        let mut journal = sample();
        journal.id = None;
        let doc = to_document(&journal);
        assert!(doc.journal.id.is_none());
        assert_eq!(from_document(&doc).unwrap().id, None);
    }

    #[test]
    fn test_summary_row_keeps_id() {
        let summary = sample().summary().unwrap();
        let row = summary_to_row(&summary);
        assert_eq!(row.id.as_deref(), Some("7"));
        assert_eq!(summary_from_row(&row).unwrap(), summary);
    }

    #[test]
    fn test_document_flattens_header() {
        let doc = to_document(&sample());
        let value = serde_json::to_value(&doc).unwrap();

        assert_eq!(value["id"], "7");
        assert_eq!(value["class_name"], "1a");
        assert_eq!(value["periods"].as_array().unwrap().len(), 2);
        assert_eq!(value["checklist"]["pc"], true);

        let back: JournalDocument = serde_json::from_value(value).unwrap();
        assert_eq!(from_document(&back).unwrap(), sample());
    }
}
