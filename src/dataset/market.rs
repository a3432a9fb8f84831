use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::dataset::wire::{SeriesPayload, WireEncoder, WirePayload};
use crate::dataset::{Dataset, unique_ids};
use crate::model::{MetaRecord, PipelineError, PriceBar};
use crate::series::frame::{SeriesFrame, parse_date};
use crate::series::{Aligner, MultiSeriesTable, Periodicity, TransformPipeline, TransformState, WorkingTable};
use crate::source::{InstrumentMetaStore, MarketSource};

pub const DEFAULT_DRIVER: &str = "adjusted_close";

/// Earliest history date requested when the caller gives none.
pub fn earliest_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Daily bars for a list of symbols. Each symbol has a table with one column
/// per bar field; changes are computed on the driver column only.
#[derive(Debug, Clone)]
pub struct MarketData {
    symbols: Vec<String>,
    from_date: NaiveDate,
    driver: String,
    trans: Vec<Periodicity>,
    series: BTreeMap<String, WorkingTable>,
    state: TransformState,
    meta: Vec<MetaRecord>,
}

impl MarketData {
    pub fn new(symbols: Vec<String>, from_date: NaiveDate) -> Self {
        Self {
            symbols: unique_ids(symbols),
            from_date,
            driver: DEFAULT_DRIVER.to_string(),
            trans: vec![Periodicity::YoY],
            series: BTreeMap::new(),
            state: TransformState::default(),
            meta: Vec::new(),
        }
    }

    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    pub fn with_transformations(mut self, trans: Vec<Periodicity>) -> Self {
        self.trans = trans;
        self
    }

    pub async fn load(
        mut self,
        source: &dyn MarketSource,
        store: &dyn InstrumentMetaStore,
    ) -> Result<Self, PipelineError> {
        self.fetch_all(source, store).await?;
        Ok(self)
    }

    pub(crate) async fn fetch_all(
        &mut self,
        source: &dyn MarketSource,
        store: &dyn InstrumentMetaStore,
    ) -> Result<(), PipelineError> {
        if !PriceBar::FIELDS.contains(&self.driver.as_str()) {
            return Err(PipelineError::UnknownColumn(self.driver.clone()));
        }
        self.get_historical(source).await?;
        self.get_meta(store).await
    }

    /// Fetches bars since `from_date` and rebuilds the per-symbol tables.
    /// Repeated `(symbol, date)` bars resolve to the later one.
    pub async fn get_historical(&mut self, source: &dyn MarketSource) -> Result<(), PipelineError> {
        let bars = source.fetch_history(&self.symbols, self.from_date).await?;

        let mut by_symbol: BTreeMap<&str, Vec<(NaiveDate, &PriceBar)>> = BTreeMap::new();
        for bar in &bars {
            let date = parse_date(&bar.symbol, &bar.date)?;
            by_symbol.entry(bar.symbol.as_str()).or_default().push((date, bar));
        }

        let mut series = BTreeMap::new();
        for symbol in &self.symbols {
            let rows = by_symbol.remove(symbol.as_str()).unwrap_or_default();
            if rows.is_empty() {
                warn!("No bars returned for {}", symbol);
            }
            let frames: Vec<SeriesFrame> = PriceBar::FIELDS
                .iter()
                .map(|field| SeriesFrame::new(*field, rows.iter().map(|(d, bar)| (*d, bar.field(field)))))
                .collect();
            let table = Aligner::union(&frames)?;
            series.insert(symbol.clone(), WorkingTable::new(table, vec![self.driver.clone()]));
        }

        info!("Loaded {} bars for {} symbols", bars.len(), self.symbols.len());
        self.series = series;
        self.state.clear();
        Ok(())
    }

    pub async fn get_meta(&mut self, store: &dyn InstrumentMetaStore) -> Result<(), PipelineError> {
        self.meta = store.lookup_instrument_meta(&self.symbols).await?;
        Ok(())
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn series_table(&self, symbol: &str) -> Option<&MultiSeriesTable> {
        self.series.get(symbol).map(WorkingTable::table)
    }

    pub fn meta(&self) -> &[MetaRecord] {
        &self.meta
    }

    /// The driver column of every symbol, named after the symbol.
    pub fn driver_frames(&self) -> Vec<SeriesFrame> {
        self.symbols
            .iter()
            .map(|symbol| {
                self.series_table(symbol)
                    .and_then(|t| t.frame(&self.driver))
                    .map(|f| f.renamed(symbol.as_str()))
                    .unwrap_or_else(|| SeriesFrame::empty(symbol.as_str()))
            })
            .collect()
    }
}

impl Dataset for MarketData {
    fn identifiers(&self) -> &[String] {
        &self.symbols
    }

    fn transform_state(&self) -> &TransformState {
        &self.state
    }

    fn apply_transformations(&mut self) -> Result<Vec<Periodicity>, PipelineError> {
        TransformPipeline::new(self.trans.clone()).apply(&mut self.state, self.series.values_mut())
    }

    fn to_wire(&self) -> WirePayload {
        let mut encoder = WireEncoder::new();
        let mut payload = WirePayload::new();
        for symbol in &self.symbols {
            let data = match self.series.get(symbol) {
                Some(working) => encoder.table_data(working.table(), None),
                None => encoder.table_data(&MultiSeriesTable::default(), None),
            };
            let meta = encoder.records_for(&self.meta, "code", symbol);
            payload.insert(symbol.clone(), SeriesPayload { meta, data });
        }
        if encoder.fallbacks() > 0 {
            debug!("{} instrument values needed a fallback cast", encoder.fallbacks());
        }
        payload
    }
}
