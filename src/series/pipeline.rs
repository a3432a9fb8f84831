use serde::Serialize;
use tracing::debug;

use crate::model::PipelineError;
use crate::series::change::{ChangeCalculator, Periodicity};
use crate::series::frame::SeriesFrame;
use crate::series::table::MultiSeriesTable;

/// Periodicities already merged into a dataset's tables, in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransformState {
    applied: Vec<Periodicity>,
}

impl TransformState {
    pub fn is_applied(&self, periodicity: Periodicity) -> bool {
        self.applied.contains(&periodicity)
    }

    pub fn applied(&self) -> &[Periodicity] {
        &self.applied
    }

    /// Returns false if `periodicity` was already recorded.
    pub fn mark(&mut self, periodicity: Periodicity) -> bool {
        if self.is_applied(periodicity) {
            return false;
        }
        self.applied.push(periodicity);
        true
    }

    pub fn clear(&mut self) {
        self.applied.clear();
    }
}

/// A table plus the columns whose changes get merged back into it. Derived
/// columns are never sources themselves.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkingTable {
    table: MultiSeriesTable,
    sources: Vec<String>,
}

impl WorkingTable {
    pub fn new(table: MultiSeriesTable, sources: Vec<String>) -> Self {
        Self { table, sources }
    }

    pub fn table(&self) -> &MultiSeriesTable {
        &self.table
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Computes every source's change for `periodicity` without touching the
    /// table. Fails if a derived column name is already taken.
    fn compute_changes(&self, periodicity: Periodicity) -> Result<Vec<SeriesFrame>, PipelineError> {
        let mut changes = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            match self.table.frame(source) {
                Some(series) => changes.push(ChangeCalculator::compute(&series, periodicity)),
                None => debug!("Source column {} missing, skipping {}", source, periodicity),
            }
        }

        if let Some(clash) = changes.iter().find(|c| self.table.has_column(c.id())) {
            return Err(PipelineError::ColumnCollision(clash.id().to_string()));
        }
        Ok(changes)
    }

    fn merge_changes(&mut self, changes: &[SeriesFrame]) -> Result<(), PipelineError> {
        for change in changes {
            self.table.left_join(change)?;
        }
        Ok(())
    }
}

/// Applies an ordered list of periodicities to a set of working tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformPipeline {
    periodicities: Vec<Periodicity>,
}

impl TransformPipeline {
    pub fn new(periodicities: Vec<Periodicity>) -> Self {
        Self { periodicities }
    }

    /// YoY, QoQ, MoM.
    pub fn standard() -> Self {
        Self::new(Periodicity::ALL.to_vec())
    }

    pub fn periodicities(&self) -> &[Periodicity] {
        &self.periodicities
    }

    /// Merges each periodicity not yet recorded in `state` into every table,
    /// then records it. Already-applied periodicities are skipped, so calling
    /// this again is a no-op. Returns the periodicities applied by this call.
    pub fn apply<'a>(
        &self,
        state: &mut TransformState,
        tables: impl IntoIterator<Item = &'a mut WorkingTable>,
    ) -> Result<Vec<Periodicity>, PipelineError> {
        let mut tables: Vec<&mut WorkingTable> = tables.into_iter().collect();
        let mut newly_applied = Vec::new();

        for &periodicity in &self.periodicities {
            if state.is_applied(periodicity) {
                debug!("{} already applied, skipping", periodicity);
                continue;
            }
            // Every table is checked before any of them is modified.
            let changes = tables
                .iter()
                .map(|table| table.compute_changes(periodicity))
                .collect::<Result<Vec<_>, _>>()?;
            for (table, table_changes) in tables.iter_mut().zip(&changes) {
                table.merge_changes(table_changes)?;
            }
            state.mark(periodicity);
            newly_applied.push(periodicity);
        }

        Ok(newly_applied)
    }
}
