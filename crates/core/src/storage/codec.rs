//! CSV encoding shared by the ledger and snapshot files: UTF-8 with a leading BOM, comma
//! delimited, header row, minimal RFC 4180 quoting, CRLF record terminators.

use crate::domain::record::{ClassificationRecord, Market};
use crate::domain::sector::Sector;
use crate::domain::strength::{StrengthRecord, Trend};
use crate::error::EngineError;
use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub const LEDGER_COLUMNS: [&str; 9] = [
    "date",
    "market",
    "sector",
    "theme",
    "ticker",
    "stock_name",
    "mention_count",
    "sentiment",
    "reason",
];

pub const SNAPSHOT_COLUMNS: [&str; 13] = [
    "market",
    "sector",
    "theme",
    "ticker",
    "stock_name",
    "strength_score",
    "mention_total",
    "last_mention_count",
    "first_seen",
    "last_seen",
    "days_count",
    "trend",
    "last_reason",
];

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotCsvRow {
    market: Market,
    sector: Sector,
    theme: String,
    ticker: String,
    stock_name: String,
    strength_score: String,
    mention_total: u64,
    last_mention_count: u64,
    first_seen: NaiveDate,
    last_seen: NaiveDate,
    days_count: u32,
    trend: Trend,
    #[serde(default)]
    last_reason: String,
}

impl From<&StrengthRecord> for SnapshotCsvRow {
    fn from(r: &StrengthRecord) -> Self {
        Self {
            market: r.market,
            sector: r.sector,
            theme: r.theme.clone(),
            ticker: r.ticker.clone(),
            stock_name: r.stock_name.clone(),
            strength_score: format!("{:.2}", r.strength_score),
            mention_total: r.mention_total,
            last_mention_count: r.last_mention_count,
            first_seen: r.first_seen,
            last_seen: r.last_seen,
            days_count: r.days_count,
            trend: r.trend,
            last_reason: r.last_reason.clone(),
        }
    }
}

impl SnapshotCsvRow {
    fn into_record(self) -> anyhow::Result<StrengthRecord> {
        let strength_score = self
            .strength_score
            .trim()
            .parse::<f64>()
            .with_context(|| format!("invalid strength_score '{}'", self.strength_score))?;
        Ok(StrengthRecord {
            market: self.market,
            sector: self.sector,
            theme: self.theme,
            ticker: self.ticker,
            stock_name: self.stock_name,
            strength_score,
            mention_total: self.mention_total,
            last_mention_count: self.last_mention_count,
            first_seen: self.first_seen,
            last_seen: self.last_seen,
            days_count: self.days_count,
            trend: self.trend,
            last_reason: self.last_reason,
        })
    }
}

fn writer() -> csv::Writer<Vec<u8>> {
    let mut buf = Vec::with_capacity(4096);
    buf.extend_from_slice(UTF8_BOM);
    csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::CRLF)
        .from_writer(buf)
}

fn finish(w: csv::Writer<Vec<u8>>) -> anyhow::Result<Vec<u8>> {
    w.into_inner()
        .map_err(|e| anyhow::anyhow!("flush csv buffer failed: {}", e.error()))
}

fn decode_text(bytes: &[u8], what: &str) -> anyhow::Result<String> {
    let (text, had_errors) = encoding_rs::UTF_8.decode_with_bom_removal(bytes);
    if had_errors {
        return Err(EngineError::storage(format!("{what} is not valid UTF-8")).into());
    }
    Ok(text.into_owned())
}

pub fn encode_ledger(records: &[ClassificationRecord]) -> anyhow::Result<Vec<u8>> {
    let mut w = writer();
    w.write_record(LEDGER_COLUMNS)
        .context("write ledger header failed")?;
    for record in records {
        w.serialize(record).context("write ledger row failed")?;
    }
    finish(w)
}

pub fn decode_ledger(bytes: &[u8]) -> anyhow::Result<Vec<ClassificationRecord>> {
    let text = decode_text(bytes, "ledger file")?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let mut out = Vec::new();
    for (idx, row) in reader.deserialize::<ClassificationRecord>().enumerate() {
        // +2: header is line 1 and rows are 1-based.
        let record = row.with_context(|| {
            EngineError::storage(format!("malformed ledger row at line {}", idx + 2))
        })?;
        out.push(record);
    }
    Ok(out)
}

pub fn encode_snapshot(rows: &[StrengthRecord]) -> anyhow::Result<Vec<u8>> {
    let mut w = writer();
    w.write_record(SNAPSHOT_COLUMNS)
        .context("write snapshot header failed")?;
    for row in rows {
        w.serialize(SnapshotCsvRow::from(row))
            .context("write snapshot row failed")?;
    }
    finish(w)
}

pub fn decode_snapshot(bytes: &[u8]) -> anyhow::Result<Vec<StrengthRecord>> {
    let text = decode_text(bytes, "snapshot file")?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let mut out = Vec::new();
    for (idx, row) in reader.deserialize::<SnapshotCsvRow>().enumerate() {
        let record = row
            .map_err(anyhow::Error::new)
            .and_then(SnapshotCsvRow::into_record)
            .with_context(|| {
                EngineError::storage(format!("malformed snapshot row at line {}", idx + 2))
            })?;
        out.push(record);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::test_support::{day, record};

    #[test]
    fn ledger_file_starts_with_bom_and_header() {
        let bytes = encode_ledger(&[]).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = std::str::from_utf8(&bytes[UTF8_BOM.len()..]).unwrap();
        assert_eq!(
            text,
            "date,market,sector,theme,ticker,stock_name,mention_count,sentiment,reason\r\n"
        );
    }

    #[test]
    fn ledger_row_layout() {
        let mut r = record(day(2026, 2, 11), "HBM메모리", "000660", 3);
        r.stock_name = "SK하이닉스".to_string();
        r.reason = "HBM 공급".to_string();
        let bytes = encode_ledger(&[r]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.ends_with("2026-02-11,KR,semiconductor,HBM메모리,000660,SK하이닉스,3,,HBM 공급\r\n"));
    }

    #[test]
    fn fields_with_delimiters_and_quotes_are_quoted() {
        let mut r = record(day(2026, 2, 11), "전력기기/변압기", "267260", 1);
        r.reason = "수주 \"대박\", 변압기".to_string();
        let bytes = encode_ledger(&[r.clone()]).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains(",\"수주 \"\"대박\"\", 변압기\"\r\n"));

        let decoded = decode_ledger(&bytes).unwrap();
        assert_eq!(decoded, vec![r]);
    }

    #[test]
    fn decodes_files_without_bom_and_with_lf() {
        let text = "date,market,sector,theme,ticker,stock_name,mention_count,sentiment,reason\n\
                    2026-02-10,US,ai,AI인프라/클라우드,MSFT,Microsoft,2,,Azure\n";
        let decoded = decode_ledger(text.as_bytes()).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].market, Market::Foreign);
        assert_eq!(decoded[0].sector, Sector::Ai);
        assert_eq!(decoded[0].mention_count, 2);
    }

    #[test]
    fn unknown_sector_code_is_a_storage_error() {
        let text = "date,market,sector,theme,ticker,stock_name,mention_count,sentiment,reason\r\n\
                    2026-02-10,KR,반도체,HBM메모리,000660,SK하이닉스,1,,x\r\n";
        let err = decode_ledger(text.as_bytes()).unwrap_err();
        assert_eq!(crate::error::kind_of(&err), Some(crate::error::ErrorKind::Storage));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);
        assert!(decode_ledger(&bytes).is_err());
    }

    #[test]
    fn snapshot_score_is_published_with_two_decimals() {
        let row = StrengthRecord {
            market: Market::Domestic,
            sector: Sector::Defense,
            theme: "방산".to_string(),
            ticker: "012450".to_string(),
            stock_name: "한화에어로스페이스".to_string(),
            strength_score: 2.7,
            mention_total: 3,
            last_mention_count: 1,
            first_seen: day(2026, 2, 10),
            last_seen: day(2026, 2, 11),
            days_count: 2,
            trend: Trend::Active,
            last_reason: "수주, 증설".to_string(),
        };
        let bytes = encode_snapshot(&[row.clone()]).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains(
            "KR,defense,방산,012450,한화에어로스페이스,2.70,3,1,2026-02-10,2026-02-11,2,ACTIVE,\"수주, 증설\"\r\n"
        ));
        assert_eq!(decode_snapshot(&bytes).unwrap(), vec![row]);
    }
}
