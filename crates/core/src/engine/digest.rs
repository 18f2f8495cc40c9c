use crate::domain::record::{ClassificationRecord, Market, TupleKey};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// What first showed up on the reference date, relative to every earlier ledger date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DailyDigest {
    pub records_today: usize,
    /// Themes never seen before in their market.
    pub new_themes: Vec<ThemeDigest>,
    /// Known themes that picked up tickers they never had before.
    pub added_to_themes: Vec<ThemeDigest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThemeDigest {
    pub market: Market,
    pub theme: String,
    pub entries: Vec<DigestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestEntry {
    pub ticker: String,
    pub stock_name: String,
    pub reason: String,
}

impl DailyDigest {
    pub fn new_entry_count(&self) -> usize {
        self.new_themes
            .iter()
            .chain(&self.added_to_themes)
            .map(|t| t.entries.len())
            .sum()
    }
}

pub fn daily_digest(ledger: &[ClassificationRecord], reference_date: NaiveDate) -> DailyDigest {
    let mut seen_tuples: HashSet<TupleKey> = HashSet::new();
    let mut seen_themes: HashSet<(Market, &str)> = HashSet::new();
    for record in ledger.iter().filter(|r| r.date < reference_date) {
        seen_tuples.insert(record.key());
        seen_themes.insert((record.market, record.theme.as_str()));
    }

    let mut new_themes: BTreeMap<(Market, String), Vec<DigestEntry>> = BTreeMap::new();
    let mut added: BTreeMap<(Market, String), Vec<DigestEntry>> = BTreeMap::new();
    let mut records_today = 0;

    for record in ledger.iter().filter(|r| r.date == reference_date) {
        records_today += 1;
        if seen_tuples.contains(&record.key()) {
            continue;
        }

        let target = if seen_themes.contains(&(record.market, record.theme.as_str())) {
            &mut added
        } else {
            &mut new_themes
        };
        target
            .entry((record.market, record.theme.clone()))
            .or_default()
            .push(DigestEntry {
                ticker: record.ticker.clone(),
                stock_name: record.stock_name.clone(),
                reason: record.reason.clone(),
            });
    }

    let flatten = |m: BTreeMap<(Market, String), Vec<DigestEntry>>| {
        m.into_iter()
            .map(|((market, theme), entries)| ThemeDigest {
                market,
                theme,
                entries,
            })
            .collect::<Vec<_>>()
    };

    DailyDigest {
        records_today,
        new_themes: flatten(new_themes),
        added_to_themes: flatten(added),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::test_support::{day, record};

    #[test]
    fn splits_new_themes_from_additions() {
        let d = day(2026, 2, 11);
        let ledger = vec![
            record(day(2026, 2, 10), "HBM메모리", "000660", 2),
            record(d, "HBM메모리", "000660", 1),
            record(d, "HBM메모리", "005930", 1),
            record(d, "양자컴퓨팅", "950170", 1),
        ];

        let digest = daily_digest(&ledger, d);
        assert_eq!(digest.records_today, 3);
        assert_eq!(digest.new_entry_count(), 2);

        assert_eq!(digest.added_to_themes.len(), 1);
        assert_eq!(digest.added_to_themes[0].theme, "HBM메모리");
        assert_eq!(digest.added_to_themes[0].entries[0].ticker, "005930");

        assert_eq!(digest.new_themes.len(), 1);
        assert_eq!(digest.new_themes[0].theme, "양자컴퓨팅");
    }

    #[test]
    fn quiet_day_has_empty_digest() {
        let d = day(2026, 2, 11);
        let ledger = vec![record(day(2026, 2, 10), "HBM메모리", "000660", 2)];
        let digest = daily_digest(&ledger, d);
        assert_eq!(digest, DailyDigest::default());
    }
}
