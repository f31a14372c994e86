//! Mapping between the canonical [`Journal`](super::Journal) and its three
//! external shapes.
//!
//! * [`form`]: the camelCase model an input form submits, with slot-indexed
//!   period arrays.
//! * [`relational`]: the snake_case rows of the `journals`, `periods` and
//!   `checklists` tables.
//! * [`local`]: records in the local fallback store. Earlier revisions wrote
//!   either naming convention, so reads accept both and prefer the relational
//!   name when a field appears twice.
//!
//! Everything in here is pure. Callers never look at field names themselves.

pub mod form;
pub mod local;
pub mod relational;

use super::types::{ClassCode, JournalHeader, ShiftType, Weather};
use crate::error::JournalError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub use form::{JournalForm, PeriodForm};
pub use local::LocalRecord;
pub use relational::{ChecklistRow, JournalDocument, JournalRow, PeriodRow};

/// Reads a boolean the remote store may have serialized as `"true"`/`"false"`.
pub fn flex_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s == "true" => Some(true),
        Value::String(s) if s == "false" => Some(false),
        _ => None,
    }
}

/// Reads an identifier that may be a JSON string or number.
pub(crate) fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn de_flex_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(flex_bool(&value).unwrap_or(false))
}

pub(crate) fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(id_string(&value).unwrap_or_default())
}

pub(crate) fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(id_string(&value))
}

/// Text columns may come back as `null`.
pub(crate) fn de_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts `YYYY-MM-DD`, and timestamps whose first ten characters are one.
pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, JournalError> {
    let trimmed = raw.trim();
    let day = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| JournalError::invalid(format!("invalid date '{raw}': {e}")))
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Collects up to two non-empty names.
pub(crate) fn reps<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    names
        .into_iter()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .take(super::types::MAX_REPS)
        .map(str::to_string)
        .collect()
}

/// Raw, still-stringly header fields shared by the relational and local readers.
#[derive(Debug, Default)]
pub(crate) struct RawHeader<'a> {
    pub date: &'a str,
    pub weather: &'a str,
    pub day_type: &'a str,
    pub class_name: &'a str,
    pub duty_reps: Vec<String>,
    pub next_duty_reps: Vec<String>,
    pub daily_comment: &'a str,
    pub teacher_comment: &'a str,
    pub substitute: &'a str,
    pub current_cleaning_duty: &'a str,
    pub next_cleaning_duty: &'a str,
}

impl RawHeader<'_> {
    /// Date and class are required. Unknown weather reads as sunny and a
    /// missing or unknown shift is taken from the class.
    pub(crate) fn into_header(self) -> Result<JournalHeader, JournalError> {
        if self.date.is_empty() {
            return Err(JournalError::invalid("record has no date"));
        }
        if self.class_name.is_empty() {
            return Err(JournalError::invalid("record has no class"));
        }

        let date = parse_date(self.date)?;
        let class: ClassCode = self.class_name.parse()?;
        let weather = self.weather.parse::<Weather>().unwrap_or_default();
        let shift = self
            .day_type
            .parse::<ShiftType>()
            .unwrap_or_else(|_| class.shift());

        Ok(JournalHeader {
            date,
            weather,
            shift,
            class,
            duty_reps: self.duty_reps,
            next_duty_reps: self.next_duty_reps,
            daily_comment: self.daily_comment.to_string(),
            teacher_comment: self.teacher_comment.to_string(),
            substitute: self.substitute.to_string(),
            current_cleaning_duty: self.current_cleaning_duty.to_string(),
            next_cleaning_duty: self.next_cleaning_duty.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flex_bool() {
        assert_eq!(flex_bool(&json!(true)), Some(true));
        assert_eq!(flex_bool(&json!("false")), Some(false));
        assert_eq!(flex_bool(&json!("yes")), None);
        assert_eq!(flex_bool(&Value::Null), None);
    }

    #[test]
    fn test_parse_date_accepts_timestamps() {
        let expected = NaiveDate::from_ymd_opt(2025, 4, 15).unwrap();
        assert_eq!(parse_date("2025-04-15").unwrap(), expected);
        assert_eq!(parse_date("2025-04-15T09:00:00+09:00").unwrap(), expected);
        assert!(parse_date("15/04/2025").is_err());
    }

    #[test]
    fn test_reps_skip_blanks() {
        assert_eq!(reps(["", "Sato", "Ito", "Kato"]), vec!["Sato", "Ito"]);
    }

    #[test]
    fn test_header_defaults() {
        let header = RawHeader {
            date: "2025-04-15",
            weather: "foggy",
            class_name: "2n",
            ..Default::default()
        }
        .into_header()
        .unwrap();

        assert_eq!(header.weather, Weather::Sunny);
        assert_eq!(header.shift, ShiftType::Night);
    }
}
