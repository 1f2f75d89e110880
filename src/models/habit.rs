use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::CadenceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Per-type shape of a recurrence rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Recurrence {
    Daily {
        interval: u32,
    },
    Weekly {
        interval: u32,
        days_of_week: Vec<Weekday>,
    },
    /// Positive days count from the start of the month and clamp to its last day.
    /// Negative days count back from the end (`-1` is the last day).
    Monthly {
        interval: u32,
        days_of_month: Vec<i32>,
    },
}

impl Recurrence {
    pub fn interval(&self) -> u32 {
        match self {
            Self::Daily { interval }
            | Self::Weekly { interval, .. }
            | Self::Monthly { interval, .. } => *interval,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Daily { .. } => "daily",
            Self::Weekly { .. } => "weekly",
            Self::Monthly { .. } => "monthly",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    #[serde(flatten)]
    pub recurrence: Recurrence,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<NaiveTime>,
}

impl RecurrenceRule {
    pub fn new(recurrence: Recurrence, start_date: NaiveDate) -> Self {
        Self {
            recurrence,
            start_date,
            time_of_day: None,
        }
    }

    pub fn validate(&self) -> Result<(), CadenceError> {
        if self.recurrence.interval() < 1 {
            return Err(CadenceError::invalid_rule("Recurrence interval must be at least 1"));
        }
        match &self.recurrence {
            Recurrence::Daily { .. } => {}
            Recurrence::Weekly { days_of_week, .. } => {
                if days_of_week.is_empty() {
                    return Err(CadenceError::invalid_rule(
                        "Weekly recurrence needs at least one day of the week",
                    ));
                }
            }
            Recurrence::Monthly { days_of_month, .. } => {
                if days_of_month.is_empty() {
                    return Err(CadenceError::invalid_rule(
                        "Monthly recurrence needs at least one day of the month",
                    ));
                }
                if let Some(bad) = days_of_month
                    .iter()
                    .find(|d| **d == 0 || !(-31..=31).contains(*d))
                {
                    return Err(CadenceError::invalid_rule(format!(
                        "Day of month out of range: {bad} (use 1..31 or -31..-1)"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Parse the stored JSON payload. The calculator only ever sees rules that
    /// passed through here.
    pub fn from_json(raw: &str) -> Result<Self, CadenceError> {
        let mut rule: RecurrenceRule = serde_json::from_str(raw)
            .map_err(|e| CadenceError::invalid_rule(format!("Invalid recurrence rule: {e}")))?;
        rule.validate()?;
        rule.normalize();
        Ok(rule)
    }

    pub fn to_json(&self) -> Result<String, CadenceError> {
        serde_json::to_string(self)
            .map_err(|e| CadenceError::invalid_rule(format!("Cannot encode recurrence rule: {e}")))
    }

    /// Sort and dedupe the day sets.
    pub fn normalize(&mut self) {
        match &mut self.recurrence {
            Recurrence::Daily { .. } => {}
            Recurrence::Weekly { days_of_week, .. } => {
                days_of_week.sort_by_key(|d| d.num_days_from_monday());
                days_of_week.dedup();
            }
            Recurrence::Monthly { days_of_month, .. } => {
                days_of_month.sort_unstable();
                days_of_month.dedup();
            }
        }
    }
}

/// A recurring source ("habit").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Habit {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub is_active: bool,
    pub checklist_template_id: Option<String>,
    pub rule: RecurrenceRule,
    pub created_at: String,
    pub updated_at: String,
}

/// Parse a comma separated weekday list (`mon,wed,fri`).
pub fn parse_weekdays(list: &str) -> Result<Vec<Weekday>, CadenceError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Weekday>()
                .map_err(|_| CadenceError::invalid_rule(format!("Unknown day of week: {s}")))
        })
        .collect()
}

/// Parse a comma separated list of month days (`1,15,-1`).
pub fn parse_month_days(list: &str) -> Result<Vec<i32>, CadenceError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i32>()
                .map_err(|_| CadenceError::invalid_rule(format!("Invalid day of month: {s}")))
        })
        .collect()
}
