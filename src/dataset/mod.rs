// Request-scoped datasets: fetched once, transformed in place, exported for the wire.

pub mod econ;
pub mod market;
pub mod overlay;
pub mod wire;

pub use econ::EconData;
pub use market::MarketData;
pub use overlay::OverlayData;
pub use wire::{SeriesPayload, WirePayload};

use crate::model::PipelineError;
use crate::series::{Periodicity, TransformState};

/// Common surface of the econ, market and overlay datasets.
pub trait Dataset {
    /// Requested identifiers, in request order, without duplicates.
    fn identifiers(&self) -> &[String];

    fn transform_state(&self) -> &TransformState;

    /// Applies the dataset's configured periodicities. Periodicities already
    /// recorded in the transform state are skipped.
    fn apply_transformations(&mut self) -> Result<Vec<Periodicity>, PipelineError>;

    fn to_wire(&self) -> WirePayload;
}

/// Drops repeated identifiers, keeping the first occurrence.
pub(crate) fn unique_ids(ids: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_ids_keeps_first_occurrence_order() {
        let ids = vec!["B".to_string(), "A".to_string(), "B".to_string()];
        assert_eq!(unique_ids(ids), vec!["B".to_string(), "A".to_string()]);
    }
}
