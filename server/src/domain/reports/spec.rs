//! Report request submitted by callers
//!
//! Decoding goes through [`RawReportSpec`] so every shape and date check
//! happens once, at the boundary.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Date format accepted in `dates`
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("dates must contain exactly two entries, got {0}")]
    DateCount(usize),

    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("date range ends ({end}) before it starts ({start})")]
    ReversedRange { start: NaiveDate, end: NaiveDate },
}

/// Explicit caller filter: dimension must be one of `values`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FilterSpec {
    pub dimension: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// Inclusive calendar date range as seen by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, SpecError> {
        if end < start {
            return Err(SpecError::ReversedRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, SpecError> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, SpecError> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|_| SpecError::InvalidDate(s.to_string()))
}

/// Comparison period requested alongside the main range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Comparison {
    #[default]
    None,
    PrevDay,
    PrevWeek,
    PrevMonth,
    PrevYear,
}

impl Comparison {
    /// Unrecognized keywords mean no comparison
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword.trim().to_lowercase().as_str() {
            "prev_day" => Self::PrevDay,
            "prev_week" => Self::PrevWeek,
            "prev_month" => Self::PrevMonth,
            "prev_year" => Self::PrevYear,
            _ => Self::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::PrevDay => "prev_day",
            Self::PrevWeek => "prev_week",
            Self::PrevMonth => "prev_month",
            Self::PrevYear => "prev_year",
        }
    }
}

/// Time bucketing applied to the `time` dimension
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Granularity {
    Hour,
    Day,
    Week,
    Month,
    #[default]
    All,
}

impl Granularity {
    /// Anything outside hour/day/week/month (including empty) is `All`
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword.trim().to_lowercase().as_str() {
            "hour" => Self::Hour,
            "day" => Self::Day,
            "week" => Self::Week,
            "month" => Self::Month,
            _ => Self::All,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::All => "all",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire shape of a report request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReportSpec {
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    #[serde(default)]
    pub dates: Option<Vec<String>>,
    #[serde(default)]
    pub compare: Option<String>,
    #[serde(default)]
    pub time_group: Option<String>,
}

/// Validated report request
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawReportSpec")]
pub struct ReportSpec {
    pub dimensions: Vec<String>,
    pub metrics: Vec<String>,
    pub filters: Vec<FilterSpec>,
    pub dates: Option<DateRange>,
    pub compare: Comparison,
    pub granularity: Granularity,
}

impl TryFrom<RawReportSpec> for ReportSpec {
    type Error = SpecError;

    fn try_from(raw: RawReportSpec) -> Result<Self, Self::Error> {
        let dates = match raw.dates.as_deref() {
            None | Some([]) => None,
            Some([start, end]) => Some(DateRange::parse(start, end)?),
            Some(other) => return Err(SpecError::DateCount(other.len())),
        };

        Ok(Self {
            dimensions: raw.dimensions,
            metrics: raw.metrics,
            filters: raw.filters,
            dates,
            compare: raw
                .compare
                .as_deref()
                .map(Comparison::from_keyword)
                .unwrap_or_default(),
            granularity: raw
                .time_group
                .as_deref()
                .map(Granularity::from_keyword)
                .unwrap_or_default(),
        })
    }
}

impl ReportSpec {
    pub fn new(dimensions: &[&str], metrics: &[&str]) -> Self {
        Self {
            dimensions: dimensions.iter().map(|s| s.to_string()).collect(),
            metrics: metrics.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, dimension: &str, values: &[&str]) -> Self {
        self.filters.push(FilterSpec {
            dimension: dimension.to_string(),
            values: values.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn with_dates(mut self, range: DateRange, compare: Comparison) -> Self {
        self.dates = Some(range);
        self.compare = compare;
        self
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }
}
