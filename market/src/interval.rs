use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MarketError;

/// Supported bar intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1s")]
    OneSecond,
    #[serde(rename = "1min")]
    OneMinute,
    #[serde(rename = "5min")]
    FiveMinutes,
    #[serde(rename = "15min")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
}

impl Interval {
    pub const ALL: [Interval; 6] = [
        Interval::OneSecond,
        Interval::OneMinute,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::OneHour,
        Interval::FourHours,
    ];

    pub fn as_ms(self) -> u64 {
        match self {
            Interval::OneSecond => 1_000,
            Interval::OneMinute => 60_000,
            Interval::FiveMinutes => 300_000,
            Interval::FifteenMinutes => 900_000,
            Interval::OneHour => 3_600_000,
            Interval::FourHours => 14_400_000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Interval::OneSecond => "1s",
            Interval::OneMinute => "1min",
            Interval::FiveMinutes => "5min",
            Interval::FifteenMinutes => "15min",
            Interval::OneHour => "1h",
            Interval::FourHours => "4h",
        }
    }

    /// Start of the bucket containing `ts_ms`. Buckets are aligned to the
    /// Unix epoch, so every 4h bucket also starts on a UTC day boundary
    /// multiple.
    pub fn bucket_start(self, ts_ms: u64) -> u64 {
        ts_ms - ts_ms % self.as_ms()
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .into_iter()
            .find(|i| i.as_str() == s.trim())
            .ok_or_else(|| MarketError::UnknownInterval(s.to_string()))
    }
}
