use crate::domain::record::{validate_batch, ClassificationRecord, Market, MAX_REASON_CHARS};
use crate::domain::sector::Sector;
use crate::error::EngineError;
use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One day of classifier output: market -> theme -> stocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyClassification {
    pub as_of_date: NaiveDate,
    #[serde(default)]
    pub kr: BTreeMap<String, Vec<ClassifiedStock>>,
    #[serde(default)]
    pub us: BTreeMap<String, Vec<ClassifiedStock>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedStock {
    pub name: String,
    pub ticker: String,
    #[serde(default)]
    pub sector: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub mention_count: Option<i64>,
    #[serde(default)]
    pub sentiment: Option<String>,
}

impl DailyClassification {
    pub fn validate_and_into_records(
        self,
        expected_as_of_date: NaiveDate,
    ) -> anyhow::Result<Vec<ClassificationRecord>> {
        if self.as_of_date != expected_as_of_date {
            return Err(EngineError::invalid_input(format!(
                "classification as_of_date mismatch: expected {expected_as_of_date}, got {}",
                self.as_of_date
            ))
            .into());
        }

        let mut out = Vec::new();
        for (market, themes) in [(Market::Domestic, self.kr), (Market::Foreign, self.us)] {
            for (theme, stocks) in themes {
                for stock in stocks {
                    out.push(stock.into_record(self.as_of_date, market, &theme)?);
                }
            }
        }

        validate_batch(self.as_of_date, &out)?;
        Ok(out)
    }
}

impl ClassifiedStock {
    fn into_record(
        self,
        date: NaiveDate,
        market: Market,
        theme: &str,
    ) -> Result<ClassificationRecord, EngineError> {
        let mention_count = match self.mention_count {
            None => 1,
            Some(n) if n < 0 => {
                return Err(EngineError::invalid_input(format!(
                    "negative mention_count {n} for ticker '{}' under theme '{theme}'",
                    self.ticker
                )))
            }
            Some(n) => u32::try_from(n).map_err(|_| {
                EngineError::invalid_input(format!(
                    "mention_count {n} out of range for ticker '{}'",
                    self.ticker
                ))
            })?,
        };

        Ok(ClassificationRecord {
            date,
            market,
            sector: Sector::normalize(&self.sector),
            theme: theme.trim().to_string(),
            ticker: self.ticker.trim().to_string(),
            stock_name: self.name.trim().to_string(),
            mention_count,
            sentiment: self
                .sentiment
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
            reason: clip_chars(self.reason.trim(), MAX_REASON_CHARS),
        })
    }
}

fn clip_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

fn parse_document(text: &str) -> anyhow::Result<DailyClassification> {
    serde_json::from_str::<DailyClassification>(text.trim_start_matches('\u{feff}')).context(
        EngineError::invalid_input("classification input is not valid JSON for the daily schema"),
    )
}

pub fn parse_classification(
    text: &str,
    expected_as_of_date: NaiveDate,
) -> anyhow::Result<Vec<ClassificationRecord>> {
    parse_document(text)?.validate_and_into_records(expected_as_of_date)
}

/// Like [`parse_classification`], but trusts the document's own `as_of_date` (backfill input).
pub fn parse_dated_classification(
    text: &str,
) -> anyhow::Result<(NaiveDate, Vec<ClassificationRecord>)> {
    let parsed = parse_document(text)?;
    let as_of_date = parsed.as_of_date;
    Ok((as_of_date, parsed.validate_and_into_records(as_of_date)?))
}
