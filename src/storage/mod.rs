pub mod persist;
pub mod sqlite;

pub use persist::{EconObservations, EconSeriesMeta, Instruments, Persistable, PriceHistory};
pub use sqlite::SqliteStorage;
