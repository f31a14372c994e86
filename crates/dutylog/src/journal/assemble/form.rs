//! The form model: what an input form submits and what an edit form is
//! pre-filled with.

use super::{parse_date, reps};
use crate::error::JournalError;
use crate::journal::types::{Checklist, Journal, JournalHeader, Period, ShiftType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PeriodForm {
    pub subject: String,
    pub teacher: String,
    pub content: String,
    pub absences: String,
    pub in_out: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JournalForm {
    pub date: String,
    pub weather: String,
    pub day_type: String,
    pub class_name: String,
    pub daily_rep: Vec<String>,
    pub next_daily_rep: Vec<String>,
    /// Slot `i` holds period `i + 1`
    pub day_periods: Vec<PeriodForm>,
    pub night_periods: Vec<PeriodForm>,
    pub daily_comment: String,
    pub teacher_comment: String,
    pub substitute: String,
    pub current_cleaning_duty: String,
    pub next_cleaning_duty: String,
    pub checklist: BTreeMap<String, bool>,
}

fn periods_from_slots(slots: &[PeriodForm], is_night: bool) -> Result<Vec<Period>, JournalError> {
    let mut periods = Vec::new();
    for (index, slot) in slots.iter().enumerate() {
        let number = u8::try_from(index + 1)
            .map_err(|_| JournalError::invalid(format!("period slot {index} out of range")))?;
        let period = Period {
            number,
            is_night,
            subject: slot.subject.clone(),
            teacher: slot.teacher.clone(),
            content: slot.content.clone(),
            absences: slot.absences.clone(),
            in_out: slot.in_out.clone(),
        };
        if !period.is_empty() {
            periods.push(period);
        }
    }
    Ok(periods)
}

fn slots_from_periods(journal: &Journal, shift: ShiftType) -> Vec<PeriodForm> {
    (1..=shift.period_count())
        .map(|number| {
            journal
                .periods
                .iter()
                .find(|p| p.is_night == shift.is_night() && p.number == number)
                .map(|p| PeriodForm {
                    subject: p.subject.clone(),
                    teacher: p.teacher.clone(),
                    content: p.content.clone(),
                    absences: p.absences.clone(),
                    in_out: p.in_out.clone(),
                })
                .unwrap_or_default()
        })
        .collect()
}

/// Converts a submitted form. Every enumerated field must parse; blank
/// periods and blank rep names are dropped.
pub fn from_form(form: &JournalForm) -> Result<Journal, JournalError> {
    let class = form.class_name.parse()?;
    let header = JournalHeader {
        date: parse_date(&form.date)?,
        weather: form.weather.parse()?,
        shift: form.day_type.parse()?,
        class,
        duty_reps: reps(form.daily_rep.iter().map(String::as_str)),
        next_duty_reps: reps(form.next_daily_rep.iter().map(String::as_str)),
        daily_comment: form.daily_comment.clone(),
        teacher_comment: form.teacher_comment.clone(),
        substitute: form.substitute.clone(),
        current_cleaning_duty: form.current_cleaning_duty.clone(),
        next_cleaning_duty: form.next_cleaning_duty.clone(),
    };

    let mut periods = periods_from_slots(&form.day_periods, false)?;
    periods.extend(periods_from_slots(&form.night_periods, true)?);

    let mut journal = Journal::new(header);
    journal.periods = periods;
    journal.checklist = Checklist::from_items(form.checklist.clone());
    journal.normalize();
    Ok(journal)
}

/// Pre-fills a form, padding both period arrays to their full slot count.
pub fn to_form(journal: &Journal) -> JournalForm {
    let h = &journal.header;
    JournalForm {
        date: h.date.format("%Y-%m-%d").to_string(),
        weather: h.weather.as_str().to_string(),
        day_type: h.shift.as_str().to_string(),
        class_name: h.class.code().to_string(),
        daily_rep: h.duty_reps.clone(),
        next_daily_rep: h.next_duty_reps.clone(),
        day_periods: slots_from_periods(journal, ShiftType::Day),
        night_periods: slots_from_periods(journal, ShiftType::Night),
        daily_comment: h.daily_comment.clone(),
        teacher_comment: h.teacher_comment.clone(),
        substitute: h.substitute.clone(),
        current_cleaning_duty: h.current_cleaning_duty.clone(),
        next_cleaning_duty: h.next_cleaning_duty.clone(),
        checklist: journal.checklist.items().clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn submitted() -> JournalForm {
        serde_json::from_value(json!({
            "date": "2025-04-15",
            "weather": "sunny",
            "dayType": "day",
            "className": "1a",
            "dailyRep": ["Sato", ""],
            "nextDailyRep": [],
            "dayPeriods": [
                { "subject": "Anatomy", "teacher": "Tanaka", "content": "Bones", "absences": "", "inOut": "" },
                { "subject": "", "teacher": "", "content": "", "absences": "", "inOut": "" },
                { "subject": "Physiology", "teacher": "", "content": "", "absences": "Ito", "inOut": "Kato left 11:00" },
                { "subject": "", "teacher": "", "content": "", "absences": "", "inOut": "" }
            ],
            "nightPeriods": [{}, {}],
            "dailyComment": "Quiet day",
            "teacherComment": "",
            "checklist": { "pc": false, "mic": false, "prints": false, "journal": false, "supplies": false },
            "currentCleaningDuty": "Group 2",
            "nextCleaningDuty": "Group 3"
        }))
        .unwrap()
    }

    #[test]
    fn test_from_form_keeps_filled_slots() {
        let journal = from_form(&submitted()).unwrap();

        let numbers: Vec<_> = journal.periods.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 3]);
        assert_eq!(journal.periods[1].in_out, "Kato left 11:00");
        assert_eq!(journal.header.duty_reps, vec!["Sato"]);
        assert!(journal.validate().is_ok());
    }

    #[test]
    fn test_to_form_pads_slots() {
        let form = to_form(&from_form(&submitted()).unwrap());

        assert_eq!(form.day_periods.len(), 4);
        assert_eq!(form.night_periods.len(), 2);
        assert_eq!(form.day_periods[2].subject, "Physiology");
        assert_eq!(form.day_periods[1], PeriodForm::default());
    }

    #[test]
    fn test_from_form_rejects_unknown_class() {
        let mut form = submitted();
        form.class_name = "9z".to_string();
        assert!(matches!(from_form(&form), Err(JournalError::Invalid { .. })));
    }
}
