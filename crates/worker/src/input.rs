use anyhow::Context;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use theme_core::domain::contract::{parse_classification, parse_dated_classification};
use theme_core::domain::record::ClassificationRecord;
use theme_core::engine::DayInput;
use theme_core::error::EngineError;
use tokio::io::AsyncReadExt;

/// What a worker invocation will do, decided from the CLI before touching storage.
#[derive(Debug)]
pub enum Plan {
    Daily { as_of_date: NaiveDate, input: DayInput },
    Backfill(Vec<(NaiveDate, Vec<ClassificationRecord>)>),
}

impl Plan {
    pub fn label(&self) -> &'static str {
        match self {
            Plan::Daily { input: DayInput::RecomputeOnly, .. } => "recompute",
            Plan::Daily { .. } => "daily",
            Plan::Backfill(_) => "backfill",
        }
    }
}

pub struct PlanArgs<'a> {
    pub as_of_date: NaiveDate,
    pub inputs: &'a [PathBuf],
    pub recompute_only: bool,
    pub backfill: bool,
}

pub async fn build_plan(args: PlanArgs<'_>) -> anyhow::Result<Plan> {
    if args.recompute_only {
        anyhow::ensure!(
            args.inputs.is_empty(),
            EngineError::invalid_input("--recompute-only does not take --input files")
        );
        return Ok(Plan::Daily {
            as_of_date: args.as_of_date,
            input: DayInput::RecomputeOnly,
        });
    }

    if args.inputs.is_empty() {
        return Err(EngineError::invalid_input(
            "no --input given (pass --recompute-only to rebuild the snapshot alone)",
        )
        .into());
    }

    if args.backfill || args.inputs.len() > 1 {
        let mut batches = Vec::with_capacity(args.inputs.len());
        for path in args.inputs {
            let text = read_input(path).await?;
            let batch = parse_dated_classification(&text)
                .with_context(|| format!("input {}", path.display()))?;
            tracing::info!(
                input = %path.display(),
                as_of_date = %batch.0,
                records = batch.1.len(),
                "loaded backfill input"
            );
            batches.push(batch);
        }
        return Ok(Plan::Backfill(batches));
    }

    let path = &args.inputs[0];
    let text = read_input(path).await?;
    let records = parse_classification(&text, args.as_of_date)
        .with_context(|| format!("input {}", path.display()))?;
    Ok(Plan::Daily {
        as_of_date: args.as_of_date,
        input: DayInput::Records(records),
    })
}

/// Reads a classification document; `-` means stdin.
async fn read_input(path: &Path) -> anyhow::Result<String> {
    let bytes = if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut buf)
            .await
            .context("read classification input from stdin failed")?;
        buf
    } else {
        tokio::fs::read(path)
            .await
            .with_context(|| format!("read classification input {} failed", path.display()))?
    };

    String::from_utf8(bytes).context(EngineError::invalid_input(format!(
        "classification input {} is not UTF-8",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use theme_core::error::{kind_of, ErrorKind};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, d).unwrap()
    }

    fn write_doc(dir: &Path, name: &str, as_of: &str) -> PathBuf {
        let path = dir.join(name);
        let body = serde_json::json!({
            "as_of_date": as_of,
            "kr": {"HBM메모리": [{"name": "SK하이닉스", "ticker": "000660", "sector": "반도체", "reason": "HBM"}]},
        });
        std::fs::write(&path, format!("\u{feff}{body}")).unwrap();
        path
    }

    #[tokio::test]
    async fn single_input_is_a_daily_run() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = vec![write_doc(dir.path(), "a.json", "2026-02-11")];
        let plan = build_plan(PlanArgs {
            as_of_date: day(11),
            inputs: &inputs,
            recompute_only: false,
            backfill: false,
        })
        .await
        .unwrap();

        match plan {
            Plan::Daily { as_of_date, input: DayInput::Records(records) } => {
                assert_eq!(as_of_date, day(11));
                assert_eq!(records.len(), 1);
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[tokio::test]
    async fn single_input_must_match_reference_date() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = vec![write_doc(dir.path(), "a.json", "2026-02-10")];
        let err = build_plan(PlanArgs {
            as_of_date: day(11),
            inputs: &inputs,
            recompute_only: false,
            backfill: false,
        })
        .await
        .unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::InvalidInput));
    }

    #[tokio::test]
    async fn several_inputs_become_a_backfill() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = vec![
            write_doc(dir.path(), "b.json", "2026-02-11"),
            write_doc(dir.path(), "a.json", "2026-02-10"),
        ];
        let plan = build_plan(PlanArgs {
            as_of_date: day(20),
            inputs: &inputs,
            recompute_only: false,
            backfill: false,
        })
        .await
        .unwrap();

        assert_eq!(plan.label(), "backfill");
        let Plan::Backfill(batches) = plan else { unreachable!() };
        let dates: Vec<_> = batches.iter().map(|(d, _)| *d).collect();
        assert_eq!(dates, vec![day(11), day(10)]);
    }

    #[tokio::test]
    async fn missing_input_is_invalid() {
        let err = build_plan(PlanArgs {
            as_of_date: day(11),
            inputs: &[],
            recompute_only: false,
            backfill: false,
        })
        .await
        .unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::InvalidInput));
    }

    #[tokio::test]
    async fn recompute_only_takes_no_input() {
        let plan = build_plan(PlanArgs {
            as_of_date: day(11),
            inputs: &[],
            recompute_only: true,
            backfill: false,
        })
        .await
        .unwrap();
        assert_eq!(plan.label(), "recompute");
    }
}
