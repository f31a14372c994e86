//! Records of the local fallback store.
//!
//! Records are written with relational names plus `isOffline`. Older records
//! hold the camelCase form model instead (`dayType`, `dailyRep`,
//! `dayPeriods`, ...), so every field is looked up by its relational name
//! first and its form-model name second.

use super::{flex_bool, parse_timestamp, reps, RawHeader};
use crate::error::JournalError;
use crate::journal::types::{Checklist, Journal, JournalSummary, Period, RecordRef};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Key of the offline flag stamped on every stored record.
pub const OFFLINE_FLAG: &str = "isOffline";

/// A record as persisted in the local fallback store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalRecord(Map<String, Value>);

impl LocalRecord {
    pub fn from_map(map: Map<String, Value>) -> Self {
        LocalRecord(map)
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Shallow merge: every key of `patch` replaces the stored one.
    pub fn merge(&mut self, patch: LocalRecord) {
        for (key, value) in patch.0 {
            self.0.insert(key, value);
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Looks a field up by its relational name, then its form-model name.
    /// `null` counts as absent.
    fn lookup(&self, relational: &str, form: &str) -> Option<&Value> {
        self.0
            .get(relational)
            .filter(|v| !v.is_null())
            .or_else(|| self.0.get(form).filter(|v| !v.is_null()))
    }

    fn text(&self, relational: &str, form: &str) -> &str {
        self.lookup(relational, form)
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    fn rep_list(&self, first: &str, second: &str, form: &str) -> Vec<String> {
        if self.0.contains_key(first) || self.0.contains_key(second) {
            return reps([self.text(first, first), self.text(second, second)]);
        }

        let names = self
            .0
            .get(form)
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).collect::<Vec<_>>())
            .unwrap_or_default();
        reps(names)
    }

    fn raw_header(&self) -> RawHeader<'_> {
        RawHeader {
            date: self.text("date", "date"),
            weather: self.text("weather", "weather"),
            day_type: self.text("day_type", "dayType"),
            class_name: self.text("class_name", "className"),
            duty_reps: self.rep_list("daily_rep_1", "daily_rep_2", "dailyRep"),
            next_duty_reps: self.rep_list("next_daily_rep_1", "next_daily_rep_2", "nextDailyRep"),
            daily_comment: self.text("daily_comment", "dailyComment"),
            teacher_comment: self.text("teacher_comment", "teacherComment"),
            substitute: self.text("substitute", "substitute"),
            current_cleaning_duty: self.text("current_cleaning_duty", "currentCleaningDuty"),
            next_cleaning_duty: self.text("next_cleaning_duty", "nextCleaningDuty"),
        }
    }

    fn periods(&self) -> Vec<Period> {
        if let Some(rows) = self.0.get("periods").and_then(Value::as_array) {
            return rows
                .iter()
                .filter_map(Value::as_object)
                .filter_map(|row| {
                    let row = LocalRecord(row.clone());
                    let number = row
                        .lookup("period_number", "periodNumber")
                        .and_then(Value::as_u64)
                        .and_then(|n| u8::try_from(n).ok())?;
                    Some(row.period(number, row.lookup("is_night", "isNight").and_then(flex_bool).unwrap_or(false)))
                })
                .collect();
        }

        let mut periods = Vec::new();
        for (key, is_night) in [("dayPeriods", false), ("nightPeriods", true)] {
            let Some(slots) = self.0.get(key).and_then(Value::as_array) else {
                continue;
            };
            for (index, slot) in slots.iter().enumerate() {
                let (Some(slot), Ok(number)) = (slot.as_object(), u8::try_from(index + 1)) else {
                    continue;
                };
                periods.push(LocalRecord(slot.clone()).period(number, is_night));
            }
        }
        periods
    }

    fn period(&self, number: u8, is_night: bool) -> Period {
        Period {
            number,
            is_night,
            subject: self.text("subject", "subject").to_string(),
            teacher: self.text("teacher", "teacher").to_string(),
            content: self.text("content", "content").to_string(),
            absences: self.text("absences", "absences").to_string(),
            in_out: self.text("in_out", "inOut").to_string(),
        }
    }

    fn checklist(&self) -> Checklist {
        let items: BTreeMap<String, bool> = self
            .0
            .get("checklist")
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| flex_bool(v).map(|b| (k.clone(), b)))
                    .collect()
            })
            .unwrap_or_default();
        Checklist::from_items(items)
    }
}

/// Reads a stored record of any provenance.
pub fn from_local(record: &LocalRecord) -> Result<Journal, JournalError> {
    let summary = summary_from_local(record)?;
    let mut journal = Journal {
        id: Some(summary.id),
        created_at: summary.created_at,
        is_offline: summary.is_offline,
        header: summary.header,
        periods: record.periods(),
        checklist: record.checklist(),
    };
    journal.normalize();
    Ok(journal)
}

pub fn summary_from_local(record: &LocalRecord) -> Result<JournalSummary, JournalError> {
    let id = record
        .id()
        .ok_or_else(|| JournalError::invalid("local record has no id"))?;

    Ok(JournalSummary {
        id: RecordRef::parse(id),
        created_at: record
            .lookup("created_at", "createdAt")
            .and_then(Value::as_str)
            .and_then(parse_timestamp),
        is_offline: record
            .lookup("is_offline", OFFLINE_FLAG)
            .and_then(flex_bool)
            .unwrap_or(false),
        header: record.raw_header().into_header()?,
    })
}

/// Writes the current shape. Identity fields are included only when set, so
/// the result also serves as an update patch.
pub fn to_local(journal: &Journal) -> LocalRecord {
    let h = &journal.header;
    let periods: Vec<Value> = journal
        .periods
        .iter()
        .filter(|p| !p.is_empty())
        .map(|p| {
            json!({
                "period_number": p.number,
                "is_night": p.is_night,
                "subject": p.subject,
                "teacher": p.teacher,
                "content": p.content,
                "absences": p.absences,
                "in_out": p.in_out,
            })
        })
        .collect();

    let rep = |names: &[String], i: usize| names.get(i).cloned().unwrap_or_default();

    let mut record = LocalRecord::default();
    if let Some(id) = &journal.id {
        record.insert("id", json!(id.as_str()));
    }
    if let Some(created_at) = journal.created_at {
        record.insert("created_at", json!(created_at.to_rfc3339()));
    }
    record.insert("date", json!(h.date.format("%Y-%m-%d").to_string()));
    record.insert("weather", json!(h.weather.as_str()));
    record.insert("day_type", json!(h.shift.as_str()));
    record.insert("class_name", json!(h.class.code()));
    record.insert("daily_rep_1", json!(rep(&h.duty_reps, 0)));
    record.insert("daily_rep_2", json!(rep(&h.duty_reps, 1)));
    record.insert("next_daily_rep_1", json!(rep(&h.next_duty_reps, 0)));
    record.insert("next_daily_rep_2", json!(rep(&h.next_duty_reps, 1)));
    record.insert("daily_comment", json!(h.daily_comment));
    record.insert("teacher_comment", json!(h.teacher_comment));
    record.insert("substitute", json!(h.substitute));
    record.insert("current_cleaning_duty", json!(h.current_cleaning_duty));
    record.insert("next_cleaning_duty", json!(h.next_cleaning_duty));
    record.insert("periods", Value::Array(periods));
    record.insert("checklist", json!(journal.checklist.items()));
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::assemble::form::{from_form, JournalForm};
    use crate::journal::types::{ClassCode, ShiftType};

    fn record(value: Value) -> LocalRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_reads_form_model_record() {
        // Shape written by the first revision: the submitted form plus identity.
        let rec = record(json!({
            "id": "offline_1713139200000",
            "created_at": "2025-04-15T00:00:00Z",
            "isOffline": true,
            "date": "2025-04-15",
            "weather": "cloudy",
            "dayType": "night",
            "className": "2n",
            "dailyRep": ["Mori"],
            "nextDailyRep": ["Abe", "Ueda"],
            "dayPeriods": [{}, {}, {}, {}],
            "nightPeriods": [{ "subject": "Ethics", "inOut": "Abe 19:00" }, {}],
            "checklist": { "pc": true }
        }));

        let journal = from_local(&rec).unwrap();
        assert!(journal.is_offline);
        assert_eq!(journal.id, Some(RecordRef::parse("offline_1713139200000")));
        assert_eq!(journal.header.class, ClassCode::Year2N);
        assert_eq!(journal.header.shift, ShiftType::Night);
        assert_eq!(journal.header.next_duty_reps, vec!["Abe", "Ueda"]);
        assert_eq!(journal.periods.len(), 1);
        assert!(journal.periods[0].is_night);
        assert_eq!(journal.periods[0].in_out, "Abe 19:00");
        assert!(journal.checklist.get("pc"));
        assert!(!journal.checklist.get("supplies"));
    }

    #[test]
    fn test_relational_name_wins() {
        let rec = record(json!({
            "id": "offline_1",
            "date": "2025-04-15",
            "class_name": "1b",
            "className": "3a",
            "daily_comment": "",
            "dailyComment": "stale",
        }));

        let summary = summary_from_local(&rec).unwrap();
        assert_eq!(summary.header.class, ClassCode::Year1B);
        // present but empty still counts as present
        assert_eq!(summary.header.daily_comment, "");
        assert!(!summary.is_offline);
    }

    #[test]
    fn test_missing_date_is_malformed() {
        let rec = record(json!({ "id": "offline_2", "className": "1a" }));
        assert!(matches!(
            summary_from_local(&rec),
            Err(JournalError::Invalid { .. })
        ));
    }

    #[test]
    fn test_round_trip_through_local_shape() {
        let form: JournalForm = serde_json::from_value(json!({
            "date": "2025-04-15",
            "weather": "rainy",
            "dayType": "day",
            "className": "3b",
            "dailyRep": ["Sato", "Ito"],
            "dayPeriods": [{}, { "subject": "Pharmacology", "absences": "Kato" }],
            "checklist": { "journal": true }
        }))
        .unwrap();

        let mut journal = from_form(&form).unwrap();
        journal.id = Some(RecordRef::parse("offline_99"));

        let mut stored = to_local(&journal);
        stored.insert(OFFLINE_FLAG, json!(true));
        let back = from_local(&stored).unwrap();

        journal.is_offline = true;
        assert_eq!(back, journal);
    }
}
