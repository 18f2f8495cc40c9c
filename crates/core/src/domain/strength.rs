use crate::domain::record::{Market, TupleKey};
use crate::domain::sector::Sector;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    /// First ever appearance is on the reference date.
    New,
    /// Seen before and again on the reference date.
    Active,
    /// Not seen on the reference date.
    Inactive,
}

impl Trend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEW" => Ok(Self::New),
            "ACTIVE" => Ok(Self::Active),
            "INACTIVE" => Ok(Self::Inactive),
            _ => Err(format!("invalid trend: '{s}'")),
        }
    }
}

/// One snapshot row. `strength_score` is already rounded to the published precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrengthRecord {
    pub market: Market,
    pub sector: Sector,
    pub theme: String,
    pub ticker: String,
    pub stock_name: String,
    pub strength_score: f64,
    pub mention_total: u64,
    pub last_mention_count: u64,
    pub first_seen: NaiveDate,
    pub last_seen: NaiveDate,
    pub days_count: u32,
    pub trend: Trend,
    pub last_reason: String,
}

impl StrengthRecord {
    pub fn key(&self) -> TupleKey {
        TupleKey {
            market: self.market,
            sector: self.sector,
            theme: self.theme.clone(),
            ticker: self.ticker.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrengthSnapshot {
    pub as_of_date: NaiveDate,
    pub rows: Vec<StrengthRecord>,
}
