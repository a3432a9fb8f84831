// Scheduled ingestion: pulls configured series and symbols from upstream into SQLite.
use std::fmt;
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use tokio::sync::{Mutex, Notify};
use tokio::time::{Duration, sleep};
use tracing::{info, warn};

use crate::config::UpdateConfig;
use crate::dataset::market::earliest_date;
use crate::model::PipelineError;
use crate::notifier::TelegramNotifier;
use crate::source::{EconSource, MarketSource};
use crate::storage::{EconObservations, EconSeriesMeta, Instruments, PriceHistory, SqliteStorage};

/// Rows written per table by one update run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub observations: usize,
    pub series_meta: usize,
    pub prices: usize,
    pub instruments: usize,
}

impl fmt::Display for UpdateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "observations: {}, series meta: {}, prices: {}, instruments: {}",
            self.observations, self.series_meta, self.prices, self.instruments
        )
    }
}

/// First date to request for `symbols`: a few days before the oldest of the
/// per-symbol latest stored bars, or the full history if any symbol is new.
pub async fn history_start(
    cfg: &UpdateConfig,
    storage: &Mutex<SqliteStorage>,
) -> Result<NaiveDate, PipelineError> {
    let latest = storage.lock().await.latest_price_date(&cfg.symbols)?;
    Ok(match latest {
        Some(date) => date.checked_sub_days(Days::new(cfg.lookback_days)).unwrap_or(date),
        None => earliest_date(),
    })
}

/// One ingestion pass. The storage lock is only held while writing.
pub async fn run_update(
    cfg: &UpdateConfig,
    econ: &dyn EconSource,
    market: &dyn MarketSource,
    storage: &Mutex<SqliteStorage>,
) -> Result<UpdateSummary, PipelineError> {
    let mut summary = UpdateSummary::default();

    if !cfg.series_ids.is_empty() {
        info!("📥 Fetching {} econ series...", cfg.series_ids.len());
        let (observations, meta) = futures::try_join!(
            econ.fetch_observations(&cfg.series_ids),
            econ.fetch_metadata(&cfg.series_ids)
        )?;
        let mut guard = storage.lock().await;
        summary.observations = guard.persist::<EconObservations>(&observations)?;
        summary.series_meta = guard.persist::<EconSeriesMeta>(&meta)?;
    }

    if !cfg.symbols.is_empty() {
        let from = history_start(cfg, storage).await?;
        info!("📥 Fetching {} symbols since {}...", cfg.symbols.len(), from);
        let bars = market.fetch_history(&cfg.symbols, from).await?;
        summary.prices = storage.lock().await.persist::<PriceHistory>(&bars)?;
    }

    if !cfg.exchange.is_empty() {
        info!("📥 Refreshing ticker list for exchange {}...", cfg.exchange);
        let tickers = market.fetch_tickers(&cfg.exchange).await?;
        summary.instruments = storage.lock().await.persist::<Instruments>(&tickers)?;
    }

    info!("✅ Update finished ({})", summary);
    Ok(summary)
}

/// Repeats [`run_update`] every `interval_seconds`, or right away when
/// `refresh` fires. Failed runs are reported and the loop carries on.
pub async fn run_forever(
    cfg: UpdateConfig,
    econ: Arc<dyn EconSource>,
    market: Arc<dyn MarketSource>,
    storage: Arc<Mutex<SqliteStorage>>,
    refresh: Arc<Notify>,
    notifier: Option<Arc<TelegramNotifier>>,
) {
    loop {
        info!("🔁 Starting update run...");
        let message = match run_update(&cfg, econ.as_ref(), market.as_ref(), &storage).await {
            Ok(summary) => format!("✅ Update finished\n{}", summary),
            Err(e) => {
                warn!("❌ Update failed: {}", e);
                format!("❌ Update failed: {}", e)
            }
        };
        if let Some(notifier) = &notifier {
            notifier.report_run(&message).await;
        }

        info!(
            "Waiting for timer ({}s) or manual refresh...",
            cfg.interval_seconds
        );
        tokio::select! {
            _ = sleep(Duration::from_secs(cfg.interval_seconds)) => {
                info!("Timer triggered.");
            }
            _ = refresh.notified() => {
                info!("Manual refresh triggered.");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::frame::date;
    use crate::source::memory::{MemoryEconSource, MemoryMarketSource, record};
    use serde_json::json;

    fn config() -> UpdateConfig {
        UpdateConfig {
            series_ids: vec!["CPI".into()],
            symbols: vec!["SPY.US".into()],
            ..UpdateConfig::default()
        }
    }

    fn econ() -> MemoryEconSource {
        MemoryEconSource::with_observations(vec![
            ("CPI", "2024-01-01", json!("300.1")),
            ("CPI", "2024-02-01", json!(".")),
        ])
    }

    fn market() -> MemoryMarketSource {
        let mut market = MemoryMarketSource::with_closes(vec![
            ("SPY.US", "2024-01-02", 470.0),
            ("SPY.US", "2024-01-10", 475.0),
        ]);
        market.tickers = vec![record(&[("code", "SPY.US"), ("name", "SPDR")])];
        market
    }

    fn storage() -> Mutex<SqliteStorage> {
        Mutex::new(SqliteStorage::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn first_run_fetches_everything() {
        let storage = storage();

        let summary = run_update(&config(), &econ(), &market(), &storage).await.unwrap();

        assert_eq!(
            summary,
            UpdateSummary {
                observations: 2,
                series_meta: 1,
                prices: 2,
                instruments: 1,
            }
        );
        assert_eq!(storage.lock().await.row_count("econ_hist").unwrap(), Some(2));
    }

    #[tokio::test]
    async fn later_runs_only_fetch_the_lookback_window() {
        let storage = storage();
        run_update(&config(), &econ(), &market(), &storage).await.unwrap();

        assert_eq!(history_start(&config(), &storage).await.unwrap(), date("2024-01-05"));
        let summary = run_update(&config(), &econ(), &market(), &storage).await.unwrap();

        assert_eq!(summary.prices, 1);
        assert_eq!(storage.lock().await.row_count("historical").unwrap(), Some(2));
    }

    #[tokio::test]
    async fn new_symbols_fetch_full_history() {
        let storage = storage();
        run_update(&config(), &econ(), &market(), &storage).await.unwrap();

        let cfg = UpdateConfig {
            symbols: vec!["SPY.US".into(), "QQQ.US".into()],
            ..config()
        };
        assert_eq!(history_start(&cfg, &storage).await.unwrap(), earliest_date());
    }

    #[tokio::test]
    async fn fetch_failures_are_reported() {
        let storage = storage();
        let result = run_update(&config(), &MemoryEconSource::failing(), &market(), &storage).await;

        assert!(matches!(result, Err(PipelineError::Fetch(_))));
        assert_eq!(storage.lock().await.row_count("econ_hist").unwrap(), Some(0));
    }

    #[test]
    fn summary_reads_well() {
        let summary = UpdateSummary {
            observations: 3,
            ..UpdateSummary::default()
        };
        assert_eq!(
            summary.to_string(),
            "observations: 3, series meta: 0, prices: 0, instruments: 0"
        );
    }
}
