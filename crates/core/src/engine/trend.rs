use crate::domain::strength::Trend;
use crate::error::EngineError;
use chrono::NaiveDate;

/// Derives the trend label from first/last-seen dates. Stateless; nothing about trends is stored.
///
/// Any combination outside `first_seen <= last_seen <= reference_date` is an integrity violation
/// of the aggregated ledger and is rejected rather than labelled.
pub fn classify(
    first_seen: NaiveDate,
    last_seen: NaiveDate,
    reference_date: NaiveDate,
) -> Result<Trend, EngineError> {
    if first_seen == reference_date && last_seen < reference_date {
        return Err(EngineError::integrity(format!(
            "first_seen is the reference date {reference_date} but last_seen is earlier ({last_seen})"
        )));
    }
    if first_seen > last_seen {
        return Err(EngineError::integrity(format!(
            "first_seen {first_seen} is after last_seen {last_seen}"
        )));
    }
    if last_seen > reference_date {
        return Err(EngineError::integrity(format!(
            "last_seen {last_seen} is after the reference date {reference_date}"
        )));
    }

    if first_seen == reference_date {
        Ok(Trend::New)
    } else if last_seen == reference_date {
        Ok(Trend::Active)
    } else {
        Ok(Trend::Inactive)
    }
}
