use std::fmt;
use std::str::FromStr;

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Chat-platform user id (Telegram ids fit in i64).
pub type UserId = i64;

/// Chat-platform chat id. Group chats are negative on Telegram.
pub type ChatId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserState {
    Active,
    Inactive,
    Banned,
}

impl UserState {
    pub fn as_str(self) -> &'static str {
        match self {
            UserState::Active => "active",
            UserState::Inactive => "inactive",
            UserState::Banned => "banned",
        }
    }
}

impl FromStr for UserState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(UserState::Active),
            "inactive" => Ok(UserState::Inactive),
            "banned" => Ok(UserState::Banned),
            other => Err(format!("unknown user state: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub display_name: String,
    pub state: UserState,
}

/// A birthday without a year.
///
/// Only the ranges are checked: day 1-31, month 1-12. Combinations that never
/// occur on a calendar (31.02) are accepted as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBirthdayDate")]
pub struct BirthdayDate {
    pub day: u8,
    pub month: u8,
}

#[derive(Deserialize)]
struct RawBirthdayDate {
    day: u8,
    month: u8,
}

impl TryFrom<RawBirthdayDate> for BirthdayDate {
    type Error = ParseDateError;

    fn try_from(raw: RawBirthdayDate) -> Result<Self, Self::Error> {
        Self::new(raw.day, raw.month)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseDateError {
    #[error("expected a date in DD.MM format, got {0:?}")]
    Format(String),
    #[error("day {0} is out of range 1-31")]
    Day(u32),
    #[error("month {0} is out of range 1-12")]
    Month(u32),
}

impl BirthdayDate {
    pub fn new(day: u8, month: u8) -> Result<Self, ParseDateError> {
        if !(1..=31).contains(&day) {
            return Err(ParseDateError::Day(day.into()));
        }
        if !(1..=12).contains(&month) {
            return Err(ParseDateError::Month(month.into()));
        }
        Ok(Self { day, month })
    }

    /// Day and month of a calendar date, e.g. `chrono::Local::now().date_naive()`.
    pub fn of<D: Datelike>(date: &D) -> Self {
        Self {
            day: date.day() as u8,
            month: date.month() as u8,
        }
    }
}

impl FromStr for BirthdayDate {
    type Err = ParseDateError;

    /// Parses `D.M`, `DD.MM` and mixes of the two.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format_err = || ParseDateError::Format(s.to_string());

        let (day, month) = s.trim().split_once('.').ok_or_else(format_err)?;
        let part = |p: &str| -> Result<u8, ParseDateError> {
            if p.is_empty() || p.len() > 2 || !p.bytes().all(|b| b.is_ascii_digit()) {
                return Err(format_err());
            }
            p.parse().map_err(|_| format_err())
        };
        Self::new(part(day)?, part(month)?)
    }
}

impl fmt::Display for BirthdayDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}.{:02}", self.day, self.month)
    }
}

/// A user whose birthday matched a lookup in one chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BirthdayMatch {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub display_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_padded_and_short_dates() {
        assert_eq!("05.03".parse(), Ok(BirthdayDate { day: 5, month: 3 }));
        assert_eq!("5.3".parse(), Ok(BirthdayDate { day: 5, month: 3 }));
        assert_eq!(" 31.12 ".parse(), Ok(BirthdayDate { day: 31, month: 12 }));
    }

    #[test]
    fn accepts_impossible_calendar_days() {
        assert_eq!("31.02".parse(), Ok(BirthdayDate { day: 31, month: 2 }));
    }

    #[test]
    fn rejects_out_of_range_parts() {
        assert_eq!("32.01".parse::<BirthdayDate>(), Err(ParseDateError::Day(32)));
        assert_eq!("00.01".parse::<BirthdayDate>(), Err(ParseDateError::Day(0)));
        assert_eq!("10.13".parse::<BirthdayDate>(), Err(ParseDateError::Month(13)));
    }

    #[test]
    fn rejects_malformed_input() {
        for input in ["", "0503", "05-03", "05.03.1990", "a.b", "+5.3", "005.03"] {
            assert!(
                matches!(input.parse::<BirthdayDate>(), Err(ParseDateError::Format(_))),
                "{input:?} should not parse"
            );
        }
    }

    #[test]
    fn deserializing_applies_the_same_range_checks() {
        let date: BirthdayDate = serde_json::from_str(r#"{"day":31,"month":2}"#).unwrap();
        assert_eq!(date, BirthdayDate { day: 31, month: 2 });

        assert!(serde_json::from_str::<BirthdayDate>(r#"{"day":0,"month":3}"#).is_err());
        assert!(serde_json::from_str::<BirthdayDate>(r#"{"day":5,"month":13}"#).is_err());
    }

    #[test]
    fn displays_zero_padded() {
        assert_eq!(BirthdayDate { day: 6, month: 3 }.to_string(), "06.03");
    }

    #[test]
    fn user_state_round_trips_through_str() {
        for state in [UserState::Active, UserState::Inactive, UserState::Banned] {
            assert_eq!(state.as_str().parse::<UserState>(), Ok(state));
        }
        assert!("deleted".parse::<UserState>().is_err());
    }
}
