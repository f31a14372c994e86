//! Canonical journal types

use crate::error::JournalError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Prefix carried by identifiers generated by the local fallback store.
pub const LOCAL_ID_PREFIX: &str = "offline_";

/// Checklist items every journal starts with.
pub const DEFAULT_CHECKLIST_KEYS: [&str; 5] = ["pc", "mic", "prints", "journal", "supplies"];

/// Maximum number of names in a duty-rep list.
pub const MAX_REPS: usize = 2;

/// A journal identifier, tagged with the store it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum RecordRef {
    /// Assigned by the remote store
    Remote(String),
    /// Generated by the local fallback store (`offline_<millis>`)
    Local(String),
}

impl RecordRef {
    /// Classifies a raw identifier by its prefix.
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with(LOCAL_ID_PREFIX) {
            RecordRef::Local(raw.to_string())
        } else {
            RecordRef::Remote(raw.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RecordRef::Remote(id) | RecordRef::Local(id) => id,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, RecordRef::Local(_))
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for RecordRef {
    fn from(raw: String) -> Self {
        RecordRef::parse(&raw)
    }
}

impl From<RecordRef> for String {
    fn from(r: RecordRef) -> Self {
        match r {
            RecordRef::Remote(id) | RecordRef::Local(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weather {
    #[default]
    Sunny,
    Cloudy,
    Rainy,
}

impl Weather {
    pub fn as_str(&self) -> &'static str {
        match self {
            Weather::Sunny => "sunny",
            Weather::Cloudy => "cloudy",
            Weather::Rainy => "rainy",
        }
    }
}

impl FromStr for Weather {
    type Err = JournalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sunny" => Ok(Weather::Sunny),
            "cloudy" => Ok(Weather::Cloudy),
            "rainy" => Ok(Weather::Rainy),
            other => Err(JournalError::invalid(format!("unknown weather '{other}'"))),
        }
    }
}

/// Which shift a class attends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftType {
    #[default]
    Day,
    Night,
}

impl ShiftType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftType::Day => "day",
            ShiftType::Night => "night",
        }
    }

    /// Number of lesson slots in this shift.
    pub fn period_count(&self) -> u8 {
        match self {
            ShiftType::Day => 4,
            ShiftType::Night => 2,
        }
    }

    pub fn is_night(&self) -> bool {
        matches!(self, ShiftType::Night)
    }

    pub fn from_night_flag(is_night: bool) -> Self {
        if is_night {
            ShiftType::Night
        } else {
            ShiftType::Day
        }
    }
}

impl FromStr for ShiftType {
    type Err = JournalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(ShiftType::Day),
            "night" => Ok(ShiftType::Night),
            other => Err(JournalError::invalid(format!("unknown shift type '{other}'"))),
        }
    }
}

/// The nine fixed class codes. Day and night classes are disjoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassCode {
    #[serde(rename = "1a")]
    Year1A,
    #[serde(rename = "1b")]
    Year1B,
    #[serde(rename = "2a")]
    Year2A,
    #[serde(rename = "2b")]
    Year2B,
    #[serde(rename = "3a")]
    Year3A,
    #[serde(rename = "3b")]
    Year3B,
    #[serde(rename = "1n")]
    Year1N,
    #[serde(rename = "2n")]
    Year2N,
    #[serde(rename = "3n")]
    Year3N,
}

impl ClassCode {
    pub const ALL: [ClassCode; 9] = [
        ClassCode::Year1A,
        ClassCode::Year1B,
        ClassCode::Year2A,
        ClassCode::Year2B,
        ClassCode::Year3A,
        ClassCode::Year3B,
        ClassCode::Year1N,
        ClassCode::Year2N,
        ClassCode::Year3N,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            ClassCode::Year1A => "1a",
            ClassCode::Year1B => "1b",
            ClassCode::Year2A => "2a",
            ClassCode::Year2B => "2b",
            ClassCode::Year3A => "3a",
            ClassCode::Year3B => "3b",
            ClassCode::Year1N => "1n",
            ClassCode::Year2N => "2n",
            ClassCode::Year3N => "3n",
        }
    }

    /// Human-readable class name, as printed on the logbook.
    pub fn display_name(&self) -> &'static str {
        match self {
            ClassCode::Year1A => "1年Aクラス",
            ClassCode::Year1B => "1年Bクラス",
            ClassCode::Year2A => "2年Aクラス",
            ClassCode::Year2B => "2年Bクラス",
            ClassCode::Year3A => "3年Aクラス",
            ClassCode::Year3B => "3年Bクラス",
            ClassCode::Year1N => "1年Nクラス",
            ClassCode::Year2N => "2年Nクラス",
            ClassCode::Year3N => "3年Nクラス",
        }
    }

    pub fn shift(&self) -> ShiftType {
        match self {
            ClassCode::Year1N | ClassCode::Year2N | ClassCode::Year3N => ShiftType::Night,
            _ => ShiftType::Day,
        }
    }
}

impl fmt::Display for ClassCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ClassCode {
    type Err = JournalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClassCode::ALL
            .into_iter()
            .find(|c| c.code() == s)
            .ok_or_else(|| JournalError::invalid(format!("unknown class '{s}'")))
    }
}

/// One lesson slot within a journal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Period {
    /// 1-4 for day periods, 1-2 for night periods
    pub number: u8,
    pub is_night: bool,
    pub subject: String,
    pub teacher: String,
    pub content: String,
    /// Absentees, free text
    pub absences: String,
    /// Mid-session arrivals and departures, free text
    pub in_out: String,
}

impl Period {
    /// A period with no text in any field is not stored.
    pub fn is_empty(&self) -> bool {
        self.subject.is_empty()
            && self.teacher.is_empty()
            && self.content.is_empty()
            && self.absences.is_empty()
            && self.in_out.is_empty()
    }

    /// Fixed time window of this slot, or an empty string when out of range.
    pub fn time_slot(&self) -> &'static str {
        const DAY: [&str; 4] = ["9:10～10:40", "10:50～12:20", "13:20～14:50", "15:00～16:30"];
        const NIGHT: [&str; 2] = ["18:00～19:30", "19:40～21:10"];

        let slots = if self.is_night { &NIGHT[..] } else { &DAY[..] };
        (self.number as usize)
            .checked_sub(1)
            .and_then(|i| slots.get(i).copied())
            .unwrap_or("")
    }
}

/// Duty-completion flags. Keys have changed across revisions, so this is a map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checklist(BTreeMap<String, bool>);

impl Checklist {
    /// All default keys set to false.
    pub fn with_defaults() -> Self {
        let mut checklist = Checklist(BTreeMap::new());
        checklist.fill_defaults();
        checklist
    }

    pub fn from_items(items: BTreeMap<String, bool>) -> Self {
        Checklist(items)
    }

    /// Inserts any missing default key as `false`; existing keys are kept.
    pub fn fill_defaults(&mut self) {
        for key in DEFAULT_CHECKLIST_KEYS {
            self.0.entry(key.to_string()).or_insert(false);
        }
    }

    pub fn get(&self, key: &str) -> bool {
        self.0.get(key).copied().unwrap_or(false)
    }

    pub fn set(&mut self, key: impl Into<String>, done: bool) {
        self.0.insert(key.into(), done);
    }

    pub fn items(&self) -> &BTreeMap<String, bool> {
        &self.0
    }
}

impl Default for Checklist {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Header fields of a journal, as listed by read-all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalHeader {
    pub date: NaiveDate,
    pub weather: Weather,
    pub shift: ShiftType,
    pub class: ClassCode,
    pub duty_reps: Vec<String>,
    pub next_duty_reps: Vec<String>,
    pub daily_comment: String,
    pub teacher_comment: String,
    pub substitute: String,
    pub current_cleaning_duty: String,
    pub next_cleaning_duty: String,
}

impl JournalHeader {
    pub fn new(date: NaiveDate, class: ClassCode) -> Self {
        Self {
            date,
            weather: Weather::default(),
            shift: class.shift(),
            class,
            duty_reps: Vec::new(),
            next_duty_reps: Vec::new(),
            daily_comment: String::new(),
            teacher_comment: String::new(),
            substitute: String::new(),
            current_cleaning_duty: String::new(),
            next_cleaning_duty: String::new(),
        }
    }
}

/// A journal together with its periods and checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    pub id: Option<RecordRef>,
    pub created_at: Option<DateTime<Utc>>,
    pub is_offline: bool,
    #[serde(flatten)]
    pub header: JournalHeader,
    pub periods: Vec<Period>,
    pub checklist: Checklist,
}

impl Journal {
    /// A new, unsaved journal with no periods and a default checklist.
    pub fn new(header: JournalHeader) -> Self {
        Self {
            id: None,
            created_at: None,
            is_offline: false,
            header,
            periods: Vec::new(),
            checklist: Checklist::with_defaults(),
        }
    }

    /// Drops empty periods and orders the rest day-first, by number.
    pub fn normalize(&mut self) {
        self.periods.retain(|p| !p.is_empty());
        self.periods.sort_by_key(|p| (p.is_night, p.number));
        self.checklist.fill_defaults();
    }

    /// Periods belonging to the journal's own shift.
    pub fn shift_periods(&self) -> impl Iterator<Item = &Period> {
        let night = self.header.shift.is_night();
        self.periods.iter().filter(move |p| p.is_night == night)
    }

    /// Checks the data-model invariants.
    pub fn validate(&self) -> Result<(), JournalError> {
        let header = &self.header;
        if header.class.shift() != header.shift {
            return Err(JournalError::invalid(format!(
                "class {} does not attend the {} shift",
                header.class,
                header.shift.as_str()
            )));
        }

        if header.duty_reps.len() > MAX_REPS || header.next_duty_reps.len() > MAX_REPS {
            return Err(JournalError::invalid(format!(
                "at most {MAX_REPS} duty reps per list"
            )));
        }

        let mut seen = Vec::with_capacity(self.periods.len());
        for period in &self.periods {
            let max = ShiftType::from_night_flag(period.is_night).period_count();
            if period.number == 0 || period.number > max {
                return Err(JournalError::invalid(format!(
                    "period {} out of range 1-{max} (night: {})",
                    period.number, period.is_night
                )));
            }

            let key = (period.number, period.is_night);
            if seen.contains(&key) {
                return Err(JournalError::invalid(format!(
                    "duplicate period {} (night: {})",
                    period.number, period.is_night
                )));
            }
            seen.push(key);
        }

        Ok(())
    }

    pub fn summary(&self) -> Option<JournalSummary> {
        Some(JournalSummary {
            id: self.id.clone()?,
            created_at: self.created_at,
            is_offline: self.is_offline,
            header: self.header.clone(),
        })
    }
}

/// A listed journal: header plus identity, without periods or checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalSummary {
    pub id: RecordRef,
    pub created_at: Option<DateTime<Utc>>,
    pub is_offline: bool,
    #[serde(flatten)]
    pub header: JournalHeader,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(class: ClassCode) -> JournalHeader {
        JournalHeader::new(NaiveDate::from_ymd_opt(2025, 4, 15).unwrap(), class)
    }

    fn period(number: u8, is_night: bool, subject: &str) -> Period {
        Period {
            number,
            is_night,
            subject: subject.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_record_ref_parse() {
        assert_eq!(
            RecordRef::parse("offline_1713139200000"),
            RecordRef::Local("offline_1713139200000".to_string())
        );
        assert_eq!(RecordRef::parse("42"), RecordRef::Remote("42".to_string()));
        assert!(!RecordRef::parse("my_offline_id").is_local());
    }

    #[test]
    fn test_record_ref_serializes_as_plain_string() {
        let json = serde_json::to_string(&RecordRef::parse("offline_1")).unwrap();
        assert_eq!(json, "\"offline_1\"");
        let back: RecordRef = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(back, RecordRef::Remote("abc".to_string()));
    }

    #[test]
    fn test_class_shift_sets_are_disjoint() {
        let day: Vec<_> = ClassCode::ALL
            .iter()
            .filter(|c| c.shift() == ShiftType::Day)
            .collect();
        assert_eq!(day.len(), 6);
        assert_eq!("2n".parse::<ClassCode>().unwrap().shift(), ShiftType::Night);
        assert!("4a".parse::<ClassCode>().is_err());
    }

    #[test]
    fn test_validate_rejects_mismatched_shift() {
        let mut h = header(ClassCode::Year1A);
        h.shift = ShiftType::Night;
        assert!(matches!(
            Journal::new(h).validate(),
            Err(JournalError::Invalid { .. })
        ));
    }

    #[test]
    fn test_validate_period_ranges() {
        let mut journal = Journal::new(header(ClassCode::Year1A));
        journal.periods = vec![period(4, false, "Math"), period(2, true, "Law")];
        assert!(journal.validate().is_ok());

        journal.periods.push(period(3, true, "Art"));
        assert!(journal.validate().is_err());

        journal.periods = vec![period(1, false, "Math"), period(1, false, "History")];
        assert!(journal.validate().is_err());
    }

    #[test]
    fn test_normalize_orders_and_drops_empty() {
        let mut journal = Journal::new(header(ClassCode::Year1A));
        journal.periods = vec![
            period(3, false, "Art"),
            period(1, true, "Law"),
            period(2, false, ""),
            period(1, false, "Math"),
        ];
        journal.normalize();

        let order: Vec<_> = journal
            .periods
            .iter()
            .map(|p| (p.number, p.is_night))
            .collect();
        assert_eq!(order, vec![(1, false), (3, false), (1, true)]);
    }

    #[test]
    fn test_checklist_defaults_keep_unknown_keys() {
        let mut items = BTreeMap::new();
        items.insert("chalk".to_string(), true);
        let mut checklist = Checklist::from_items(items);
        checklist.fill_defaults();

        assert!(checklist.get("chalk"));
        assert!(!checklist.get("pc"));
        assert_eq!(checklist.items().len(), 6);
    }

    #[test]
    fn test_time_slot() {
        assert_eq!(period(1, false, "x").time_slot(), "9:10～10:40");
        assert_eq!(period(2, true, "x").time_slot(), "19:40～21:10");
        assert_eq!(period(3, true, "x").time_slot(), "");
    }
}
