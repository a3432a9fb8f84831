use chrono::NaiveDate;

use crate::model::{FetchError, MetaRecord, PriceBar, RawObservation, StorageError};

/// Economic series provider. Every call returns a fully materialized result or fails.
#[async_trait::async_trait]
pub trait EconSource: Send + Sync {
    /// Long-format `(id, date, value)` rows for every requested id.
    async fn fetch_observations(&self, ids: &[String]) -> Result<Vec<RawObservation>, FetchError>;
    /// One descriptive record per id, keyed by the `id` field.
    async fn fetch_metadata(&self, ids: &[String]) -> Result<Vec<MetaRecord>, FetchError>;
    /// Release info per id, keyed by the `series_id` field.
    async fn fetch_releases(&self, ids: &[String]) -> Result<Vec<MetaRecord>, FetchError>;
}

/// End-of-day market data provider.
#[async_trait::async_trait]
pub trait MarketSource: Send + Sync {
    async fn fetch_history(&self, symbols: &[String], from: NaiveDate) -> Result<Vec<PriceBar>, FetchError>;
    /// Instruments listed on `exchange`, keyed by the `code` field.
    async fn fetch_tickers(&self, exchange: &str) -> Result<Vec<MetaRecord>, FetchError>;
}

/// Persisted instrument descriptions, keyed by symbol.
#[async_trait::async_trait]
pub trait InstrumentMetaStore: Send + Sync {
    async fn lookup_instrument_meta(&self, symbols: &[String]) -> Result<Vec<MetaRecord>, StorageError>;
}
