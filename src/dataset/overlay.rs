use chrono::NaiveDate;
use tracing::{debug, info};

use crate::dataset::econ::EconData;
use crate::dataset::market::MarketData;
use crate::dataset::wire::{SeriesPayload, WireEncoder, WirePayload};
use crate::dataset::{Dataset, unique_ids};
use crate::model::PipelineError;
use crate::series::{Aligner, MultiSeriesTable, Periodicity, TransformPipeline, TransformState, WorkingTable};
use crate::source::{EconSource, InstrumentMetaStore, MarketSource};

/// Economic series and market driver prices on one daily calendar.
#[derive(Debug, Clone)]
pub struct OverlayData {
    identifiers: Vec<String>,
    econ: EconData,
    market: MarketData,
    trans: Vec<Periodicity>,
    working: WorkingTable,
    state: TransformState,
}

impl OverlayData {
    pub fn new(econ_ids: Vec<String>, market_symbols: Vec<String>, from_date: NaiveDate) -> Self {
        let econ = EconData::new(econ_ids).with_transformations(Vec::new());
        let market = MarketData::new(market_symbols, from_date).with_transformations(Vec::new());
        let identifiers = unique_ids(econ.series_ids().iter().chain(market.symbols()).cloned().collect());
        Self {
            identifiers,
            econ,
            market,
            trans: vec![Periodicity::YoY],
            working: WorkingTable::default(),
            state: TransformState::default(),
        }
    }

    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.market = self.market.with_driver(driver);
        self
    }

    pub fn with_transformations(mut self, trans: Vec<Periodicity>) -> Self {
        self.trans = trans;
        self
    }

    pub async fn load(
        mut self,
        econ_source: &dyn EconSource,
        market_source: &dyn MarketSource,
        store: &dyn InstrumentMetaStore,
    ) -> Result<Self, PipelineError> {
        futures::try_join!(
            self.econ.get_data(econ_source),
            self.market.fetch_all(market_source, store)
        )?;
        self.get_historical()?;
        Ok(self)
    }

    /// Rebuilds the daily overlay from the already-fetched econ and market
    /// data. A market symbol equal to an econ series id is a column collision.
    pub fn get_historical(&mut self) -> Result<(), PipelineError> {
        let market_wide = Aligner::union(&self.market.driver_frames())?;
        let table = Aligner::daily(&[self.econ.historical(), &market_wide])?;

        info!(
            "Overlay of {} series over {} days",
            table.columns().len(),
            table.len()
        );
        self.working = WorkingTable::new(table, self.identifiers.clone());
        self.state.clear();
        Ok(())
    }

    pub fn table(&self) -> &MultiSeriesTable {
        self.working.table()
    }

    pub fn econ(&self) -> &EconData {
        &self.econ
    }

    pub fn market(&self) -> &MarketData {
        &self.market
    }
}

impl Dataset for OverlayData {
    fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    fn transform_state(&self) -> &TransformState {
        &self.state
    }

    fn apply_transformations(&mut self) -> Result<Vec<Periodicity>, PipelineError> {
        TransformPipeline::new(self.trans.clone()).apply(&mut self.state, [&mut self.working])
    }

    /// Each identifier exports the shared date axis, its own column and its
    /// derived columns.
    fn to_wire(&self) -> WirePayload {
        let mut encoder = WireEncoder::new();
        let mut payload = WirePayload::new();

        for id in &self.identifiers {
            let mut columns = vec![id.clone()];
            columns.extend(self.state.applied().iter().map(|p| p.column_name(id)));
            let data = encoder.table_data(self.working.table(), Some(&columns));

            let meta = if self.econ.series_ids().contains(id) {
                encoder.records_for(self.econ.meta(), "id", id)
            } else {
                encoder.records_for(self.market.meta(), "code", id)
            };
            payload.insert(id.clone(), SeriesPayload { meta, data });
        }
        if encoder.fallbacks() > 0 {
            debug!("{} metadata values needed a fallback cast", encoder.fallbacks());
        }
        payload
    }
}
