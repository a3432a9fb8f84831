use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::dataset::wire::{SeriesPayload, WireEncoder, WirePayload};
use crate::dataset::{Dataset, unique_ids};
use crate::model::{MetaRecord, PipelineError};
use crate::series::frame::{SeriesFrame, extract_frames};
use crate::series::{Aligner, MultiSeriesTable, Periodicity, TransformPipeline, TransformState, WorkingTable};
use crate::source::EconSource;

/// Economic series for a fixed list of ids.
///
/// `historical` is the wide table over the union of every series' dates. Each
/// series also gets its own working table over only its own dates, and that
/// is where derived change columns are merged and what gets exported.
#[derive(Debug, Clone)]
pub struct EconData {
    series_ids: Vec<String>,
    trans: Vec<Periodicity>,
    historical: MultiSeriesTable,
    series: BTreeMap<String, WorkingTable>,
    state: TransformState,
    meta: Vec<MetaRecord>,
    releases: Vec<MetaRecord>,
}

impl EconData {
    pub fn new(series_ids: Vec<String>) -> Self {
        Self {
            series_ids: unique_ids(series_ids),
            trans: Periodicity::ALL.to_vec(),
            historical: MultiSeriesTable::default(),
            series: BTreeMap::new(),
            state: TransformState::default(),
            meta: Vec::new(),
            releases: Vec::new(),
        }
    }

    pub fn with_transformations(mut self, trans: Vec<Periodicity>) -> Self {
        self.trans = trans;
        self
    }

    pub async fn load(mut self, source: &dyn EconSource) -> Result<Self, PipelineError> {
        self.get_data(source).await?;
        Ok(self)
    }

    /// Fetches observations, metadata and releases, then rebuilds every table.
    /// Any failure leaves the dataset as it was. A successful re-fetch resets
    /// the transform state, since derived columns belong to the old data.
    pub async fn get_data(&mut self, source: &dyn EconSource) -> Result<(), PipelineError> {
        let ids = &self.series_ids;
        let (raw, meta, releases) = futures::try_join!(
            source.fetch_observations(ids),
            source.fetch_metadata(ids),
            source.fetch_releases(ids)
        )?;

        let mut extracted = extract_frames(&raw)?;
        if extracted.coerced > 0 {
            warn!("{} non-numeric observations coerced to null", extracted.coerced);
        }

        let frames: Vec<SeriesFrame> = self
            .series_ids
            .iter()
            .map(|id| extracted.take(id).unwrap_or_else(|| SeriesFrame::empty(id.as_str())))
            .collect();

        let historical = Aligner::union(&frames)?;
        let mut series = BTreeMap::new();
        for frame in frames {
            let id = frame.id().to_string();
            if frame.is_empty() {
                warn!("No observations returned for {}", id);
            }
            let table = Aligner::union(std::slice::from_ref(&frame))?;
            series.insert(id.clone(), WorkingTable::new(table, vec![id]));
        }

        info!(
            "Loaded {} econ series over {} dates",
            self.series_ids.len(),
            historical.len()
        );

        self.historical = historical;
        self.series = series;
        self.meta = meta;
        self.releases = releases;
        self.state.clear();
        Ok(())
    }

    pub fn series_ids(&self) -> &[String] {
        &self.series_ids
    }

    pub fn historical(&self) -> &MultiSeriesTable {
        &self.historical
    }

    pub fn series_table(&self, id: &str) -> Option<&MultiSeriesTable> {
        self.series.get(id).map(WorkingTable::table)
    }

    pub fn meta(&self) -> &[MetaRecord] {
        &self.meta
    }

    pub fn releases(&self) -> &[MetaRecord] {
        &self.releases
    }
}

impl Dataset for EconData {
    fn identifiers(&self) -> &[String] {
        &self.series_ids
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
        for id in &self.series_ids {
            let data = match self.series.get(id) {
                Some(working) => encoder.table_data(working.table(), None),
                None => encoder.table_data(&MultiSeriesTable::default(), None),
            };
            let meta = encoder.records_for(&self.meta, "id", id);
            payload.insert(id.clone(), SeriesPayload { meta, data });
        }
        if encoder.fallbacks() > 0 {
            debug!("{} metadata values needed a fallback cast", encoder.fallbacks());
        }
        payload
    }
}
