use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;
use strum_macros::EnumIter;
use strum_macros::EnumString;
use ts_rs::TS;

use crate::schema::SchemaField;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    TS,
    schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum QueryOperator {
    Term,
    Match,
    Wildcard,
}

/// Lookback window of a query. Variants are declared shortest first so the
/// derived ordering compares lookback length.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    TS,
    schemars::JsonSchema,
)]
pub enum TimeRange {
    #[serde(rename = "1h")]
    #[strum(serialize = "1h")]
    OneHour,
    #[default]
    #[serde(rename = "24h")]
    #[strum(serialize = "24h")]
    TwentyFourHours,
    #[serde(rename = "7d")]
    #[strum(serialize = "7d")]
    SevenDays,
}

impl TimeRange {
    pub const fn lookback(self) -> Duration {
        match self {
            TimeRange::OneHour => Duration::from_secs(60 * 60),
            TimeRange::TwentyFourHours => Duration::from_secs(24 * 60 * 60),
            TimeRange::SevenDays => Duration::from_secs(7 * 24 * 60 * 60),
        }
    }

    /// Relative date-math expression understood by the search backend.
    pub fn date_math(self) -> String {
        format!("now-{self}")
    }
}

/// A criterion value as typed by the analyst: free text, or a number when the
/// form control produced one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, schemars::JsonSchema)]
#[serde(untagged)]
pub enum QueryValue {
    Number(f64),
    Text(String),
}

impl QueryValue {
    /// Empty text, `0` and `NaN` carry no usable value.
    pub fn is_blank(&self) -> bool {
        match self {
            QueryValue::Number(n) => *n == 0.0 || n.is_nan(),
            QueryValue::Text(s) => s.is_empty(),
        }
    }

    /// Finite numeric reading of the value, if it has one. `inf` and `NaN`
    /// spellings are not numbers to the search backend.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            QueryValue::Number(n) => Some(*n).filter(|n| n.is_finite()),
            QueryValue::Text(_) => self.numeric_text().and_then(|text| text.parse().ok()),
        }
    }

    /// Trimmed text of a value that reads as a finite number.
    pub fn numeric_text(&self) -> Option<&str> {
        match self {
            QueryValue::Number(_) => None,
            QueryValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return None;
                }
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .map(|_| trimmed)
            }
        }
    }
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryValue::Number(n) => write!(f, "{n}"),
            QueryValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Text(value)
    }
}

impl From<f64> for QueryValue {
    fn from(value: f64) -> Self {
        QueryValue::Number(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Number(value as f64)
    }
}

/// The field/operator/value/time tuple the analyst submits. Built per
/// submission and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryCriterion {
    pub field: SchemaField,
    pub operator: QueryOperator,
    pub value: QueryValue,
    pub time_range: TimeRange,
}
