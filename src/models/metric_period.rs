//! # Metric Period
//!
//! Enumerated trailing analysis windows. Every computation in the pipeline is
//! scoped to one of these periods; a tenant has at most one current result row
//! per (metric type, period).

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A trailing analysis window: 7, 30 or 90 days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MetricPeriod {
    SevenDays,
    ThirtyDays,
    NinetyDays,
}

impl MetricPeriod {
    /// All periods, in the order the daily run processes them
    pub const ALL: [MetricPeriod; 3] = [
        MetricPeriod::SevenDays,
        MetricPeriod::ThirtyDays,
        MetricPeriod::NinetyDays,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricPeriod::SevenDays => "7d",
            MetricPeriod::ThirtyDays => "30d",
            MetricPeriod::NinetyDays => "90d",
        }
    }

    pub fn days(&self) -> i64 {
        match self {
            MetricPeriod::SevenDays => 7,
            MetricPeriod::ThirtyDays => 30,
            MetricPeriod::NinetyDays => 90,
        }
    }

    /// Start of the window ending at `end`
    pub fn window_start(&self, end: NaiveDate) -> NaiveDate {
        end - Duration::days(self.days())
    }
}

impl fmt::Display for MetricPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7d" => Ok(MetricPeriod::SevenDays),
            "30d" => Ok(MetricPeriod::ThirtyDays),
            "90d" => Ok(MetricPeriod::NinetyDays),
            other => Err(format!("unknown metric period: {other}")),
        }
    }
}

impl TryFrom<String> for MetricPeriod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MetricPeriod> for String {
    fn from(period: MetricPeriod) -> Self {
        period.as_str().to_string()
    }
}
