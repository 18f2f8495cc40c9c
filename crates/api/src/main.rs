use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use theme_core::domain::record::{ClassificationRecord, Market};
use theme_core::domain::sector::Sector;
use theme_core::domain::strength::{StrengthRecord, Trend};
use theme_core::storage::Stores;

const MAX_LIMIT: usize = 5000;

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

    let stores = match Stores::open(&settings, settings.storage_backend).await {
        Ok(stores) => Some(stores),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %format!("{e:#}"), "storage unavailable; starting API in degraded mode");
            None
        }
    };

    let state = AppState { stores };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/strength", get(get_strength))
        .route("/strength/:market/:ticker", get(get_strength_for_ticker))
        .route("/ledger/:date", get(get_ledger_for_date))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, backend = ?settings.storage_backend, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    stores: Option<Stores>,
}

#[derive(Debug, Default, Deserialize)]
struct StrengthQuery {
    market: Option<String>,
    sector: Option<String>,
    trend: Option<String>,
    limit: Option<String>,
}

#[derive(Debug, Default, PartialEq)]
struct StrengthFilter {
    market: Option<Market>,
    sector: Option<Sector>,
    trend: Option<Trend>,
    limit: Option<usize>,
}

impl StrengthFilter {
    fn parse(q: &StrengthQuery) -> Result<Self, StatusCode> {
        fn opt<T: std::str::FromStr>(v: &Option<String>) -> Result<Option<T>, StatusCode> {
            v.as_deref()
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.trim().parse::<T>().map_err(|_| StatusCode::BAD_REQUEST))
                .transpose()
        }

        let limit: Option<usize> = opt(&q.limit)?;
        if let Some(l) = limit {
            if !(1..=MAX_LIMIT).contains(&l) {
                return Err(StatusCode::BAD_REQUEST);
            }
        }

        Ok(Self {
            market: opt(&q.market)?,
            sector: opt(&q.sector)?,
            trend: opt(&q.trend)?,
            limit,
        })
    }

    fn matches(&self, row: &StrengthRecord) -> bool {
        self.market.map_or(true, |m| row.market == m)
            && self.sector.map_or(true, |s| row.sector == s)
            && self.trend.map_or(true, |t| row.trend == t)
    }

    /// Keeps snapshot order, so the result is still score-ranked.
    fn apply(&self, rows: Vec<StrengthRecord>) -> (usize, Vec<StrengthRecord>) {
        let matched: Vec<_> = rows.into_iter().filter(|r| self.matches(r)).collect();
        let total = matched.len();
        let limited = match self.limit {
            Some(l) => matched.into_iter().take(l).collect(),
            None => matched,
        };
        (total, limited)
    }
}

#[derive(Debug, Serialize)]
struct ApiStrength {
    as_of_date: Option<NaiveDate>,
    total: usize,
    rows: Vec<StrengthRecord>,
}

fn stores(state: &AppState) -> Result<&Stores, StatusCode> {
    state.stores.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

fn internal(e: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&e);
    tracing::error!(error = %format!("{e:#}"), "api storage read failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn get_strength(
    State(state): State<AppState>,
    Query(query): Query<StrengthQuery>,
) -> Result<Json<ApiStrength>, StatusCode> {
    let stores = stores(&state)?;
    let filter = StrengthFilter::parse(&query)?;

    let snapshot = stores
        .snapshots
        .read_latest()
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let (total, rows) = filter.apply(snapshot.rows);
    Ok(Json(ApiStrength {
        as_of_date: snapshot.as_of_date,
        total,
        rows,
    }))
}

async fn get_strength_for_ticker(
    State(state): State<AppState>,
    Path((market, ticker)): Path<(String, String)>,
) -> Result<Json<Vec<StrengthRecord>>, StatusCode> {
    let stores = stores(&state)?;
    let market: Market = market.parse().map_err(|_| StatusCode::BAD_REQUEST)?;

    let snapshot = stores
        .snapshots
        .read_latest()
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let rows = rows_for_ticker(snapshot.rows, market, &ticker);
    if rows.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(rows))
}

fn rows_for_ticker(rows: Vec<StrengthRecord>, market: Market, ticker: &str) -> Vec<StrengthRecord> {
    let ticker = ticker.trim();
    rows.into_iter()
        .filter(|r| r.market == market && r.ticker.eq_ignore_ascii_case(ticker))
        .collect()
}

async fn get_ledger_for_date(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<Vec<ClassificationRecord>>, StatusCode> {
    let stores = stores(&state)?;
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| StatusCode::BAD_REQUEST)?;

    let records = stores.ledger.read_date(date).await.map_err(internal)?;
    if records.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(records))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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

#[cfg(test)]
mod tests {
    use super::*;

    fn row(market: Market, ticker: &str, sector: Sector, trend: Trend, score: f64) -> StrengthRecord {
        let d = NaiveDate::from_ymd_opt(2026, 2, 11).unwrap();
        StrengthRecord {
            market,
            sector,
            theme: "테마".to_string(),
            ticker: ticker.to_string(),
            stock_name: ticker.to_string(),
            strength_score: score,
            mention_total: 1,
            last_mention_count: 1,
            first_seen: d,
            last_seen: d,
            days_count: 1,
            trend,
            last_reason: String::new(),
        }
    }

    fn rows() -> Vec<StrengthRecord> {
        vec![
            row(Market::Foreign, "NVDA", Sector::Semiconductor, Trend::Active, 5.0),
            row(Market::Domestic, "000660", Sector::Semiconductor, Trend::New, 3.0),
            row(Market::Domestic, "012450", Sector::Defense, Trend::Inactive, 1.0),
        ]
    }

    fn query(
        market: Option<&str>,
        sector: Option<&str>,
        trend: Option<&str>,
        limit: Option<&str>,
    ) -> StrengthQuery {
        StrengthQuery {
            market: market.map(str::to_string),
            sector: sector.map(str::to_string),
            trend: trend.map(str::to_string),
            limit: limit.map(str::to_string),
        }
    }

    #[test]
    fn empty_query_keeps_everything() {
        let filter = StrengthFilter::parse(&StrengthQuery::default()).unwrap();
        let (total, out) = filter.apply(rows());
        assert_eq!(total, 3);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn filters_combine_and_limit_applies_after_total() {
        let filter =
            StrengthFilter::parse(&query(Some("KR"), Some("semiconductor"), None, None)).unwrap();
        let (_, out) = filter.apply(rows());
        assert_eq!(out.iter().map(|r| r.ticker.as_str()).collect::<Vec<_>>(), vec!["000660"]);

        let filter = StrengthFilter::parse(&query(None, None, None, Some("1"))).unwrap();
        let (total, out) = filter.apply(rows());
        assert_eq!(total, 3);
        assert_eq!(out[0].ticker, "NVDA");
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn trend_filter() {
        let filter = StrengthFilter::parse(&query(None, None, Some("INACTIVE"), None)).unwrap();
        let (_, out) = filter.apply(rows());
        assert_eq!(out[0].ticker, "012450");
    }

    #[test]
    fn bad_values_are_bad_requests() {
        assert_eq!(
            StrengthFilter::parse(&query(Some("JP"), None, None, None)),
            Err(StatusCode::BAD_REQUEST)
        );
        assert_eq!(
            StrengthFilter::parse(&query(None, Some("widgets"), None, None)),
            Err(StatusCode::BAD_REQUEST)
        );
        assert_eq!(
            StrengthFilter::parse(&query(None, None, None, Some("0"))),
            Err(StatusCode::BAD_REQUEST)
        );
    }

    #[test]
    fn ticker_lookup_is_case_insensitive_within_market() {
        assert_eq!(rows_for_ticker(rows(), Market::Foreign, "nvda").len(), 1);
        assert!(rows_for_ticker(rows(), Market::Domestic, "NVDA").is_empty());
    }

    #[tokio::test]
    async fn degraded_state_is_unavailable() {
        let state = AppState { stores: None };
        let err = get_ledger_for_date(State(state), Path("2026-02-11".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err, StatusCode::SERVICE_UNAVAILABLE);
    }
}
