use anyhow::Context;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

const KST_OFFSET_SECS: i32 = 9 * 3600;

pub fn kst() -> anyhow::Result<FixedOffset> {
    FixedOffset::east_opt(KST_OFFSET_SECS).context("invalid KST offset")
}

/// The run's reference date: the explicit `YYYY-MM-DD` argument if given, otherwise the KST
/// calendar date of `now_utc`. Channels post every day, so there is no business-day rollback.
pub fn resolve_reference_date(
    as_of_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = as_of_date_arg {
        return NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid reference date '{s}' (expected YYYY-MM-DD)"));
    }

    Ok(now_utc.with_timezone(&kst()?).date_naive())
}
