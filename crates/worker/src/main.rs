use clap::Parser;
use std::path::PathBuf;
use theme_core::config::StorageBackend;
use theme_core::engine::{run_backfill, run_daily, RunSummary};
use theme_core::error::{kind_of, EngineError};
use theme_core::storage::Stores;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod input;

#[derive(Debug, Parser)]
#[command(name = "theme_worker")]
struct Args {
    /// Reference date (YYYY-MM-DD). Defaults to today's KST date.
    #[arg(long)]
    as_of_date: Option<String>,

    /// Classification JSON for the day (`-` for stdin). Repeat to backfill several dates.
    #[arg(long = "input", value_name = "PATH")]
    inputs: Vec<PathBuf>,

    /// Take each input's date from its own `as_of_date` even for a single file.
    #[arg(long)]
    backfill: bool,

    /// Skip the ledger and only rebuild the snapshot as of the reference date.
    #[arg(long, conflicts_with = "backfill")]
    recompute_only: bool,

    /// Compute and report everything without writing the ledger or the snapshot.
    #[arg(long)]
    dry_run: bool,

    /// Storage backend override (csv | postgres). Defaults to THEME_STORAGE_BACKEND.
    #[arg(long)]
    backend: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = theme_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    match run(args, &settings).await {
        Ok(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Err(err) => {
            let kind = kind_of(&err);
            tracing::error!(
                error_kind = kind.map(|k| k.as_str()).unwrap_or("unclassified"),
                retryable = kind.map(|k| k.is_retryable()).unwrap_or(false),
                error = %format!("{err:#}"),
                "theme strength run failed"
            );
            sentry_anyhow::capture_anyhow(&err);
            Err(err)
        }
    }
}

async fn run(
    args: Args,
    settings: &theme_core::config::Settings,
) -> anyhow::Result<RunSummary> {
    let backend = match args.backend.as_deref() {
        Some(s) => s.parse::<StorageBackend>()?,
        None => settings.storage_backend,
    };

    let as_of_date = theme_core::time::kst::resolve_reference_date(
        args.as_of_date.as_deref(),
        chrono::Utc::now(),
    )?;

    let plan = input::build_plan(input::PlanArgs {
        as_of_date,
        inputs: &args.inputs,
        recompute_only: args.recompute_only,
        backfill: args.backfill,
    })
    .await?;

    tracing::info!(
        %as_of_date,
        plan = plan.label(),
        ?backend,
        dry_run = args.dry_run,
        "theme worker starting"
    );

    let stores = Stores::open(settings, backend).await?;

    let lock = match &stores.pool {
        Some(pool) if !args.dry_run => Some(require_lock(
            theme_core::storage::lock::try_acquire_ledger_lock(pool).await?,
        )?),
        _ => None,
    };

    let result = match plan {
        input::Plan::Daily { as_of_date, input } => {
            run_daily(
                stores.ledger.as_ref(),
                stores.snapshots.as_ref(),
                as_of_date,
                input,
                args.dry_run,
            )
            .await
        }
        input::Plan::Backfill(batches) => {
            run_backfill(
                stores.ledger.as_ref(),
                stores.snapshots.as_ref(),
                as_of_date,
                batches,
                args.dry_run,
            )
            .await
        }
    };

    if let Some(lock) = lock {
        if let Err(err) = lock.release().await {
            tracing::warn!(error = %format!("{err:#}"), "ledger lock release failed");
        }
    }

    result
}

/// A lock held by another run is a retryable storage failure, so the scheduler sees a non-zero
/// exit and runs again.
fn require_lock<L>(acquired: Option<L>) -> anyhow::Result<L> {
    acquired.ok_or_else(|| {
        EngineError::storage("ledger lock not acquired; another run is in progress").into()
    })
}

fn init_sentry(settings: &theme_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
