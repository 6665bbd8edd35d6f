//! Recurrence patterns
//!
//! A pattern is the step between two occurrences of a recurring expense and
//! also the length of a budget window. Month and year steps follow the civil
//! calendar: when the target month is shorter than the source day, the result
//! is clamped to the last day of that month.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrencePattern {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl RecurrencePattern {
    pub const ALL: [RecurrencePattern; 4] = [
        RecurrencePattern::Daily,
        RecurrencePattern::Weekly,
        RecurrencePattern::Monthly,
        RecurrencePattern::Yearly,
    ];

    /// Step `from` forward by one period
    ///
    /// Jan 31 + 1 month is Feb 28 (Feb 29 in leap years), never Mar 2/3.
    pub fn advance(&self, from: DateTime<Utc>) -> Result<DateTime<Utc>, LedgerError> {
        let next = match self {
            Self::Daily => from.checked_add_signed(Duration::days(1)),
            Self::Weekly => from.checked_add_signed(Duration::days(7)),
            Self::Monthly => from.checked_add_months(Months::new(1)),
            Self::Yearly => from.checked_add_months(Months::new(12)),
        };
        next.ok_or_else(|| {
            LedgerError::Validation(format!("{} step from {} is out of range", self, from))
        })
    }

    /// Multiplier that converts one occurrence into a monthly equivalent
    pub fn monthly_factor(&self) -> f64 {
        match self {
            Self::Daily => 30.0,
            Self::Weekly => 4.0,
            Self::Monthly => 1.0,
            Self::Yearly => 1.0 / 12.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

impl fmt::Display for RecurrencePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecurrencePattern {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "day" | "d" => Ok(Self::Daily),
            "weekly" | "week" | "w" => Ok(Self::Weekly),
            "monthly" | "month" | "m" => Ok(Self::Monthly),
            "yearly" | "year" | "annual" | "y" => Ok(Self::Yearly),
            other => Err(LedgerError::Validation(format!(
                "Unknown recurrence pattern '{}': expected daily, weekly, monthly or yearly",
                other
            ))),
        }
    }
}
