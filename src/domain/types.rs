//! Shared domain enumerations aligned with persisted database enums.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Kind of engagement recorded in the score ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "score_kind", rename_all = "UPPERCASE")]
pub enum ScoreKind {
    Like,
    Read,
}

/// Trailing window used by the trending ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Day,
    #[default]
    Week,
    Month,
}

impl Timeframe {
    pub fn days(self) -> i64 {
        match self {
            Timeframe::Day => 1,
            Timeframe::Week => 7,
            Timeframe::Month => 30,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::Day => "day",
            Timeframe::Week => "week",
            Timeframe::Month => "month",
        }
    }
}

impl FromStr for Timeframe {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "day" => Ok(Timeframe::Day),
            "week" => Ok(Timeframe::Week),
            "month" => Ok(Timeframe::Month),
            other => Err(DomainError::validation(format!(
                "invalid timeframe `{other}`"
            ))),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_maps_to_trailing_days() {
        assert_eq!("day".parse::<Timeframe>().unwrap().days(), 1);
        assert_eq!("week".parse::<Timeframe>().unwrap().days(), 7);
        assert_eq!("month".parse::<Timeframe>().unwrap().days(), 30);
    }

    #[test]
    fn unknown_timeframe_is_rejected() {
        let err = "year".parse::<Timeframe>().expect_err("year is not supported");
        assert!(matches!(err, DomainError::Validation { .. }));
    }
}
