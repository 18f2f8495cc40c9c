use crate::domain::sector::Sector;
use crate::error::EngineError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Upper bound on `reason`, in characters.
pub const MAX_REASON_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Market {
    #[serde(rename = "KR", alias = "kr", alias = "domestic")]
    Domestic,
    #[serde(rename = "US", alias = "us", alias = "foreign")]
    Foreign,
}

impl Market {
    pub fn code(self) -> &'static str {
        match self {
            Self::Domestic => "KR",
            Self::Foreign => "US",
        }
    }

    /// Loose shape check: KRX short codes are 6 alphanumerics, US tickers are short symbols.
    pub fn is_plausible_ticker(self, ticker: &str) -> bool {
        match self {
            Self::Domestic => {
                ticker.len() == 6 && ticker.chars().all(|c| c.is_ascii_alphanumeric())
            }
            Self::Foreign => {
                (1..=10).contains(&ticker.len())
                    && ticker
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
            }
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Market {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kr" | "domestic" => Ok(Self::Domestic),
            "us" | "foreign" => Ok(Self::Foreign),
            _ => Err(format!("invalid market: '{s}' (expected KR or US)")),
        }
    }
}

/// One ledger row: a ticker classified under a theme on a given date.
///
/// Field order is the ledger file's column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub date: NaiveDate,
    pub market: Market,
    pub sector: Sector,
    pub theme: String,
    pub ticker: String,
    pub stock_name: String,
    pub mention_count: u32,
    #[serde(default)]
    pub sentiment: String,
    #[serde(default)]
    pub reason: String,
}

/// Aggregation identity. A ticker under two themes is two tuples.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TupleKey {
    pub market: Market,
    pub sector: Sector,
    pub theme: String,
    pub ticker: String,
}

impl fmt::Display for TupleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.market, self.sector, self.theme, self.ticker)
    }
}

impl ClassificationRecord {
    pub fn key(&self) -> TupleKey {
        TupleKey {
            market: self.market,
            sector: self.sector,
            theme: self.theme.clone(),
            ticker: self.ticker.clone(),
        }
    }

    fn validate_for(&self, as_of_date: NaiveDate) -> Result<(), EngineError> {
        let key = self.key();
        if self.date != as_of_date {
            return Err(EngineError::invalid_input(format!(
                "record {key} is dated {} but the batch is for {as_of_date}",
                self.date
            )));
        }
        if self.theme.trim().is_empty() {
            return Err(EngineError::invalid_input(format!(
                "record for ticker '{}' has an empty theme",
                self.ticker
            )));
        }
        if self.ticker.trim().is_empty() {
            return Err(EngineError::invalid_input(format!(
                "record under theme '{}' has an empty ticker",
                self.theme
            )));
        }
        if self.stock_name.trim().is_empty() {
            return Err(EngineError::invalid_input(format!(
                "record {key} has an empty stock_name"
            )));
        }
        if self.mention_count == 0 {
            return Err(EngineError::invalid_input(format!(
                "record {key} has mention_count 0"
            )));
        }
        let reason_chars = self.reason.chars().count();
        if reason_chars > MAX_REASON_CHARS {
            return Err(EngineError::invalid_input(format!(
                "record {key} has a reason of {reason_chars} chars (max {MAX_REASON_CHARS})"
            )));
        }
        Ok(())
    }
}

/// Checks a full day's batch before anything is written. One bad record rejects the batch.
pub fn validate_batch(
    as_of_date: NaiveDate,
    records: &[ClassificationRecord],
) -> anyhow::Result<()> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        record.validate_for(as_of_date)?;

        let key = record.key();
        if !seen.insert(key.clone()) {
            return Err(EngineError::invalid_input(format!(
                "duplicate tuple {key} in batch for {as_of_date}"
            ))
            .into());
        }

        if !record.market.is_plausible_ticker(&record.ticker) {
            tracing::warn!(%as_of_date, tuple = %key, "ticker shape unusual for market");
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn record(date: NaiveDate, theme: &str, ticker: &str, mention_count: u32) -> ClassificationRecord {
        ClassificationRecord {
            date,
            market: Market::Domestic,
            sector: Sector::Semiconductor,
            theme: theme.to_string(),
            ticker: ticker.to_string(),
            stock_name: format!("Name {ticker}"),
            mention_count,
            sentiment: String::new(),
            reason: format!("reason {ticker}"),
        }
    }

    pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{day, record};
    use super::*;
    use crate::error::{kind_of, ErrorKind};

    #[test]
    fn accepts_same_ticker_under_two_themes() {
        let d = day(2026, 2, 11);
        let batch = vec![
            record(d, "HBM메모리", "000660", 3),
            record(d, "AI반도체", "000660", 1),
        ];
        validate_batch(d, &batch).unwrap();
    }

    #[test]
    fn accepts_empty_batch() {
        validate_batch(day(2026, 2, 11), &[]).unwrap();
    }

    #[test]
    fn rejects_zero_mentions() {
        let d = day(2026, 2, 11);
        let err = validate_batch(d, &[record(d, "HBM메모리", "000660", 0)]).unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::InvalidInput));
    }

    #[test]
    fn rejects_record_dated_after_batch() {
        let d = day(2026, 2, 11);
        let future = record(day(2026, 2, 12), "HBM메모리", "000660", 1);
        let err = validate_batch(d, &[future]).unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::InvalidInput));
        assert!(err.to_string().contains("2026-02-12"));
    }

    #[test]
    fn rejects_missing_identity_fields() {
        let d = day(2026, 2, 11);
        let mut no_ticker = record(d, "HBM메모리", "000660", 1);
        no_ticker.ticker = "  ".to_string();
        assert!(validate_batch(d, &[no_ticker]).is_err());

        let mut no_theme = record(d, "HBM메모리", "000660", 1);
        no_theme.theme.clear();
        assert!(validate_batch(d, &[no_theme]).is_err());
    }

    #[test]
    fn rejects_overlong_reason() {
        let d = day(2026, 2, 11);
        let mut r = record(d, "HBM메모리", "000660", 1);
        r.reason = "가".repeat(MAX_REASON_CHARS + 1);
        assert!(validate_batch(d, &[r]).is_err());
    }

    #[test]
    fn rejects_duplicate_tuple() {
        let d = day(2026, 2, 11);
        let batch = vec![
            record(d, "HBM메모리", "000660", 1),
            record(d, "HBM메모리", "000660", 2),
        ];
        let err = validate_batch(d, &batch).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn market_parses_codes_and_names() {
        assert_eq!("kr".parse::<Market>().unwrap(), Market::Domestic);
        assert_eq!("Foreign".parse::<Market>().unwrap(), Market::Foreign);
        assert!("JP".parse::<Market>().is_err());
    }

    #[test]
    fn ticker_shape_depends_on_market() {
        assert!(Market::Domestic.is_plausible_ticker("005930"));
        assert!(!Market::Domestic.is_plausible_ticker("NVDA"));
        assert!(Market::Foreign.is_plausible_ticker("BRK.B"));
    }
}
