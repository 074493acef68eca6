//! Partially-known calendar dates.
//!
//! A date mention rarely pins down every field: "в мае" knows only the month,
//! "через два дня" knows only a relative offset. `PartialDateTime` keeps the
//! known subset and merges evidence from several mentions.
//!
//! # Merge rules
//! - every field prefers the left side, falling back to the right
//! - each side's relative offset is masked against fields the merged result
//!   already knows (a known day drops the offset's day component, a known
//!   hour drops its hours, and so on), then the masked offsets are summed
//! - when year, month and day are all known the summed offset is applied

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{PreprocessError, Result};

const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_DAY: i64 = 86_400 * MICROS_PER_SECOND;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialDateTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minute: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub microsecond: Option<u32>,
    /// 0 = Monday
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekday: Option<u32>,
    /// Signed offset in microseconds, not yet applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_offset_us: Option<i64>,
}

impl PartialDateTime {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Self {
        Self {
            year: Some(year),
            month: Some(month),
            day: Some(day),
            ..Default::default()
        }
    }

    pub fn relative(offset: TimeDelta) -> Self {
        Self {
            relative_offset_us: offset.num_microseconds(),
            ..Default::default()
        }
    }

    /// Parse `DD.MM.YYYY`. Calendar-invalid dates are rejected.
    pub fn parse_dmy(literal: &str) -> Result<Self> {
        let parts: Vec<&str> = literal.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(PreprocessError::malformed_date(literal, "expected DD.MM.YYYY"));
        }
        let number = |s: &str| {
            s.parse::<u32>()
                .map_err(|e| PreprocessError::malformed_date(literal, e.to_string()))
        };
        let day = number(parts[0])?;
        let month = number(parts[1])?;
        let year = i32::try_from(number(parts[2])?)
            .map_err(|_| PreprocessError::malformed_date(literal, "year out of range"))?;

        if NaiveDate::from_ymd_opt(year, month, day).is_none() {
            return Err(PreprocessError::malformed_date(literal, "no such calendar day"));
        }
        Ok(Self::from_ymd(year, month, day))
    }

    pub fn relative_offset(&self) -> Option<TimeDelta> {
        self.relative_offset_us.map(TimeDelta::microseconds)
    }

    pub fn is_complete(&self) -> bool {
        self.year.is_some() && self.month.is_some() && self.day.is_some()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year?, self.month?, self.day?)
    }

    fn to_naive_datetime(&self) -> Option<NaiveDateTime> {
        self.to_naive_date()?.and_hms_micro_opt(
            self.hour.unwrap_or(0),
            self.minute.unwrap_or(0),
            self.second.unwrap_or(0),
            self.microsecond.unwrap_or(0),
        )
    }

    /// Combine two partial dates, preferring fields of `self`.
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = Self {
            year: self.year.or(other.year),
            month: self.month.or(other.month),
            day: self.day.or(other.day),
            hour: self.hour.or(other.hour),
            minute: self.minute.or(other.minute),
            second: self.second.or(other.second),
            microsecond: self.microsecond.or(other.microsecond),
            weekday: self.weekday.or(other.weekday),
            relative_offset_us: None,
        };

        let offset = [self.relative_offset_us, other.relative_offset_us]
            .into_iter()
            .flatten()
            .map(|us| merged.mask_offset(us))
            .sum::<i64>();
        if self.relative_offset_us.is_some() || other.relative_offset_us.is_some() {
            merged.relative_offset_us = Some(offset);
        }

        if merged.is_complete() {
            merged = merged.apply_offset();
        }
        merged
    }

    /// Drop the components of an offset that this date already knows.
    fn mask_offset(&self, offset_us: i64) -> i64 {
        let mut days = offset_us.div_euclid(MICROS_PER_DAY);
        let rest = offset_us.rem_euclid(MICROS_PER_DAY);
        let seconds = rest / MICROS_PER_SECOND;
        let mut micros = rest % MICROS_PER_SECOND;
        let (mut hours, mut minutes, mut secs) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);

        if self.is_complete() {
            days = 0;
        }
        if self.hour.is_some() {
            hours = 0;
        }
        if self.minute.is_some() {
            minutes = 0;
        }
        if self.second.is_some() {
            secs = 0;
        }
        if self.microsecond.is_some() {
            micros = 0;
        }
        days * MICROS_PER_DAY + (hours * 3600 + minutes * 60 + secs) * MICROS_PER_SECOND + micros
    }

    /// Resolve the pending offset into concrete fields.
    fn apply_offset(self) -> Self {
        let Some(offset) = self.relative_offset_us.filter(|us| *us != 0) else {
            return self;
        };
        let Some(resolved) = self
            .to_naive_datetime()
            .and_then(|dt| dt.checked_add_signed(TimeDelta::microseconds(offset)))
        else {
            return self;
        };

        let time_shift = offset.rem_euclid(MICROS_PER_DAY) != 0;
        let keep = |known: Option<u32>, value: u32| (known.is_some() || time_shift).then_some(value);
        Self {
            year: Some(resolved.year()),
            month: Some(resolved.month()),
            day: Some(resolved.day()),
            hour: keep(self.hour, resolved.hour()),
            minute: keep(self.minute, resolved.minute()),
            second: keep(self.second, resolved.second()),
            microsecond: self.microsecond.map(|_| resolved.nanosecond() / 1_000),
            weekday: self
                .weekday
                .map(|_| resolved.weekday().num_days_from_monday()),
            relative_offset_us: Some(0),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
