// Time-series core: frames, wide tables, alignment and period-over-period transforms.

pub mod aligner;
pub mod change;
pub mod frame;
pub mod pipeline;
pub mod table;

pub use aligner::Aligner;
pub use change::{ChangeCalculator, Periodicity};
pub use frame::SeriesFrame;
pub use pipeline::{TransformPipeline, TransformState, WorkingTable};
pub use table::MultiSeriesTable;
