// In-memory sources used by tests in place of the HTTP clients.
use chrono::NaiveDate;

use crate::model::{FetchError, MetaRecord, MetaValue, PriceBar, RawObservation, StorageError, meta_text};
use crate::series::frame::parse_date;
use crate::source::traits::{EconSource, InstrumentMetaStore, MarketSource};

#[derive(Debug, Default, Clone)]
pub struct MemoryEconSource {
    pub observations: Vec<RawObservation>,
    pub meta: Vec<MetaRecord>,
    pub releases: Vec<MetaRecord>,
    pub fail: bool,
}

impl MemoryEconSource {
    pub fn with_observations(rows: Vec<(&str, &str, serde_json::Value)>) -> Self {
        let observations: Vec<RawObservation> = rows
            .into_iter()
            .map(|(id, date, value)| RawObservation::new(id, date, value))
            .collect();
        let mut ids: Vec<String> = Vec::new();
        for row in &observations {
            if !ids.contains(&row.id) {
                ids.push(row.id.clone());
            }
        }
        let meta = ids
            .iter()
            .map(|id| {
                let title = format!("{id} title");
                record(&[("id", id.as_str()), ("title", title.as_str())])
            })
            .collect();
        Self {
            observations,
            meta,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn check(&self) -> Result<(), FetchError> {
        if self.fail {
            return Err(FetchError::Upstream("source unavailable".into()));
        }
        Ok(())
    }
}

pub fn record(fields: &[(&str, &str)]) -> MetaRecord {
    fields
        .iter()
        .map(|(k, v)| (k.to_string(), MetaValue::from(*v)))
        .collect()
}

#[async_trait::async_trait]
impl EconSource for MemoryEconSource {
    async fn fetch_observations(&self, ids: &[String]) -> Result<Vec<RawObservation>, FetchError> {
        self.check()?;
        Ok(self.observations.iter().filter(|o| ids.contains(&o.id)).cloned().collect())
    }

    async fn fetch_metadata(&self, ids: &[String]) -> Result<Vec<MetaRecord>, FetchError> {
        self.check()?;
        Ok(self
            .meta
            .iter()
            .filter(|r| meta_text(r, "id").is_some_and(|id| ids.iter().any(|i| i == id)))
            .cloned()
            .collect())
    }

    async fn fetch_releases(&self, _ids: &[String]) -> Result<Vec<MetaRecord>, FetchError> {
        self.check()?;
        Ok(self.releases.clone())
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryMarketSource {
    pub bars: Vec<PriceBar>,
    pub tickers: Vec<MetaRecord>,
    pub fail: bool,
}

impl MemoryMarketSource {
    pub fn with_closes(rows: Vec<(&str, &str, f64)>) -> Self {
        let bars = rows
            .into_iter()
            .map(|(symbol, date, close)| bar(symbol, date, close))
            .collect();
        Self {
            bars,
            ..Self::default()
        }
    }
}

pub fn bar(symbol: &str, date: &str, close: f64) -> PriceBar {
    PriceBar {
        symbol: symbol.to_string(),
        date: date.to_string(),
        open: Some(close - 1.0),
        high: Some(close + 1.0),
        low: Some(close - 2.0),
        close: Some(close),
        adjusted_close: Some(close),
        volume: Some(1000.0),
    }
}

#[async_trait::async_trait]
impl MarketSource for MemoryMarketSource {
    async fn fetch_history(&self, symbols: &[String], from: NaiveDate) -> Result<Vec<PriceBar>, FetchError> {
        if self.fail {
            return Err(FetchError::Status {
                status: 503,
                url: "memory://eod".into(),
            });
        }
        Ok(self
            .bars
            .iter()
            .filter(|b| symbols.contains(&b.symbol))
            .filter(|b| parse_date(&b.symbol, &b.date).map_or(true, |d| d >= from))
            .cloned()
            .collect())
    }

    async fn fetch_tickers(&self, _exchange: &str) -> Result<Vec<MetaRecord>, FetchError> {
        Ok(self.tickers.clone())
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryInstrumentStore {
    pub records: Vec<MetaRecord>,
}

#[async_trait::async_trait]
impl InstrumentMetaStore for MemoryInstrumentStore {
    async fn lookup_instrument_meta(&self, symbols: &[String]) -> Result<Vec<MetaRecord>, StorageError> {
        Ok(self
            .records
            .iter()
            .filter(|r| meta_text(r, "code").is_some_and(|c| symbols.iter().any(|s| s == c)))
            .cloned()
            .collect())
    }
}
