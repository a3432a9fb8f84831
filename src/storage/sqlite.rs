use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, params_from_iter};
use tokio::sync::Mutex;

use crate::model::{MetaRecord, MetaValue, StorageError};
use crate::series::frame::DATE_FORMAT;
use crate::source::InstrumentMetaStore;
use crate::storage::persist::{EconObservations, EconSeriesMeta, Instruments, Persistable, PriceHistory};

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens the database file and brings every table up to the current schema.
    pub fn new(db_path: &str) -> Result<Self, StorageError> {
        Self::with_connection(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        EconObservations::create_schema(&conn)?;
        EconSeriesMeta::create_schema(&conn)?;
        PriceHistory::create_schema(&conn)?;
        Instruments::create_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Upserts `rows` into the table owned by `P`.
    pub fn persist<P: Persistable>(&mut self, rows: &[P::Row]) -> Result<usize, StorageError> {
        if rows.is_empty() {
            return Ok(0);
        }
        P::upsert(&mut self.conn, rows)
    }

    /// The earliest of the per-symbol latest stored bar dates. `None` when any
    /// symbol has no stored history, so the caller fetches everything.
    pub fn latest_price_date(&self, symbols: &[String]) -> Result<Option<NaiveDate>, StorageError> {
        if symbols.is_empty() {
            return Ok(None);
        }

        let mut stmt = self.conn.prepare("SELECT MAX(date) FROM historical WHERE symbol = ?1")?;
        let mut earliest: Option<NaiveDate> = None;
        for symbol in symbols {
            let latest: Option<String> = stmt.query_row([symbol], |row| row.get(0))?;
            let Some(latest) = latest else {
                return Ok(None);
            };
            let date = NaiveDate::parse_from_str(&latest, DATE_FORMAT)
                .map_err(|e| StorageError::Conversion(format!("stored date {latest:?}: {e}")))?;
            earliest = Some(earliest.map_or(date, |d| d.min(date)));
        }
        Ok(earliest)
    }

    /// Stored instrument descriptions for `symbols`, matched on `code`.
    pub fn lookup_instrument_meta(&self, symbols: &[String]) -> Result<Vec<MetaRecord>, StorageError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let columns = Instruments::COLUMNS
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = symbols.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT {columns} FROM \"{}\" WHERE code IN ({placeholders}) ORDER BY code",
            Instruments::TABLE
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(symbols), |row| {
            Instruments::COLUMNS
                .iter()
                .enumerate()
                .map(|(i, name)| Ok((name.to_string(), row.get::<_, MetaValue>(i)?)))
                .collect::<Result<MetaRecord, rusqlite::Error>>()
        })?;

        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }
        Ok(records)
    }

    /// Number of stored rows in `table`, if it exists.
    pub fn row_count(&self, table: &str) -> Result<Option<i64>, StorageError> {
        let exists = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(None);
        }
        let count = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| row.get(0))?;
        Ok(Some(count))
    }
}

#[async_trait::async_trait]
impl InstrumentMetaStore for Mutex<SqliteStorage> {
    async fn lookup_instrument_meta(&self, symbols: &[String]) -> Result<Vec<MetaRecord>, StorageError> {
        self.lock().await.lookup_instrument_meta(symbols)
    }
}
