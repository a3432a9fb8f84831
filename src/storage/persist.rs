// Table writers: idempotent schema creation and batch upserts keyed by unique constraints.
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{Connection, params, params_from_iter};

use crate::model::{MetaRecord, MetaValue, PriceBar, RawObservation, StorageError};
use crate::series::frame::{coerce_value, format_date, parse_date};
use crate::source::fred::SERIES_META_COLUMNS;

/// A writer that owns one table: creates it and upserts rows into it.
pub trait Persistable {
    type Row;

    const TABLE: &'static str;

    /// Creates the table if missing and adds any columns older schemas lack.
    fn create_schema(conn: &Connection) -> Result<(), StorageError>;

    /// Inserts or updates `rows` in one transaction; returns rows written.
    fn upsert(conn: &mut Connection, rows: &[Self::Row]) -> Result<usize, StorageError>;
}

impl ToSql for MetaValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            MetaValue::Null => ToSqlOutput::Owned(SqlValue::Null),
            MetaValue::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            MetaValue::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            MetaValue::Real(r) => ToSqlOutput::Owned(SqlValue::Real(*r)),
            MetaValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            MetaValue::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl FromSql for MetaValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => MetaValue::Null,
            ValueRef::Integer(i) => MetaValue::Integer(i),
            ValueRef::Real(r) => MetaValue::Real(r),
            ValueRef::Text(t) => MetaValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => MetaValue::Bytes(b.to_vec()),
        })
    }
}

/// Adds `column` to `table` unless it already exists.
pub fn migrate_add_column_if_missing(
    conn: &Connection,
    table: &str,
    column: &str,
    column_def: &str,
) -> Result<(), StorageError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\")", table))?;
    let existing_columns: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<_, _>>()?;

    if !existing_columns.iter().any(|c| c == column) {
        conn.execute(&format!("ALTER TABLE \"{}\" ADD COLUMN \"{}\" {}", table, column, column_def), [])?;
    }
    Ok(())
}

/// `INSERT ... ON CONFLICT (keys) DO UPDATE` for every non-key column.
fn upsert_sql(table: &str, columns: &[&str], keys: &[&str]) -> String {
    let quoted = |cols: &[&str]| cols.iter().map(|c| format!("\"{c}\"")).collect::<Vec<_>>().join(", ");
    let placeholders = (1..=columns.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
    let updates = columns
        .iter()
        .filter(|c| !keys.contains(c))
        .map(|c| format!("\"{c}\" = excluded.\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO \"{table}\" ({}) VALUES ({placeholders}) ON CONFLICT ({}) DO UPDATE SET {updates}",
        quoted(columns),
        quoted(keys),
    )
}

/// Upserts metadata records; fields a record lacks are written as NULL.
fn upsert_records(
    conn: &mut Connection,
    table: &str,
    columns: &[&str],
    keys: &[&str],
    rows: &[MetaRecord],
) -> Result<usize, StorageError> {
    let null = MetaValue::Null;
    let tx = conn.transaction()?;
    let mut written = 0;
    {
        let mut stmt = tx.prepare(&upsert_sql(table, columns, keys))?;
        for row in rows {
            if keys.iter().any(|k| matches!(row.get(*k), None | Some(MetaValue::Null))) {
                continue;
            }
            let values = columns.iter().map(|c| row.get(*c).unwrap_or(&null));
            written += stmt.execute(params_from_iter(values))?;
        }
    }
    tx.commit()?;
    Ok(written)
}

fn create_table(conn: &Connection, table: &str, columns: &[(&str, &str)], keys: &[&str]) -> Result<(), StorageError> {
    let defs = columns
        .iter()
        .map(|(name, def)| format!("\"{name}\" {def}"))
        .collect::<Vec<_>>()
        .join(", ");
    let unique = keys.iter().map(|k| format!("\"{k}\"")).collect::<Vec<_>>().join(", ");
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" ({defs}, CONSTRAINT \"{table}_uniques\" UNIQUE ({unique}))"
    ))?;
    for (name, def) in columns {
        migrate_add_column_if_missing(conn, table, name, def)?;
    }
    Ok(())
}

/// FRED observations, unique per `(id, date)`.
pub struct EconObservations;

impl Persistable for EconObservations {
    type Row = RawObservation;

    const TABLE: &'static str = "econ_hist";

    fn create_schema(conn: &Connection) -> Result<(), StorageError> {
        create_table(
            conn,
            Self::TABLE,
            &[("id", "TEXT NOT NULL"), ("date", "TEXT NOT NULL"), ("value", "REAL")],
            &["id", "date"],
        )
    }

    fn upsert(conn: &mut Connection, rows: &[RawObservation]) -> Result<usize, StorageError> {
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(&upsert_sql(Self::TABLE, &["id", "date", "value"], &["id", "date"]))?;
            for row in rows {
                let date = parse_date(&row.id, &row.date).map_err(|e| StorageError::Conversion(e.to_string()))?;
                let value = coerce_value(&row.value).value();
                written += stmt.execute(params![row.id, format_date(date), value])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }
}

/// FRED series descriptions, unique per `id`.
pub struct EconSeriesMeta;

impl Persistable for EconSeriesMeta {
    type Row = MetaRecord;

    const TABLE: &'static str = "econ_series_meta";

    fn create_schema(conn: &Connection) -> Result<(), StorageError> {
        let columns: Vec<(&str, &str)> = SERIES_META_COLUMNS
            .iter()
            .map(|c| match *c {
                "id" => (*c, "TEXT NOT NULL"),
                "popularity" => (*c, "INTEGER"),
                _ => (*c, "TEXT"),
            })
            .collect();
        create_table(conn, Self::TABLE, &columns, &["id"])
    }

    fn upsert(conn: &mut Connection, rows: &[MetaRecord]) -> Result<usize, StorageError> {
        upsert_records(conn, Self::TABLE, &SERIES_META_COLUMNS, &["id"], rows)
    }
}

/// Daily bars, unique per `(symbol, date)`.
pub struct PriceHistory;

impl PriceHistory {
    const COLUMNS: [&'static str; 8] = ["symbol", "date", "open", "high", "low", "close", "adjusted_close", "volume"];
}

impl Persistable for PriceHistory {
    type Row = PriceBar;

    const TABLE: &'static str = "historical";

    fn create_schema(conn: &Connection) -> Result<(), StorageError> {
        let columns: Vec<(&str, &str)> = Self::COLUMNS
            .iter()
            .map(|c| match *c {
                "symbol" | "date" => (*c, "TEXT NOT NULL"),
                _ => (*c, "REAL"),
            })
            .collect();
        create_table(conn, Self::TABLE, &columns, &["symbol", "date"])
    }

    fn upsert(conn: &mut Connection, rows: &[PriceBar]) -> Result<usize, StorageError> {
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(&upsert_sql(Self::TABLE, &Self::COLUMNS, &["symbol", "date"]))?;
            for bar in rows {
                let date = parse_date(&bar.symbol, &bar.date).map_err(|e| StorageError::Conversion(e.to_string()))?;
                written += stmt.execute(params![
                    bar.symbol,
                    format_date(date),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.adjusted_close,
                    bar.volume,
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }
}

/// Exchange-listed instruments, unique per `code`.
pub struct Instruments;

impl Instruments {
    pub const COLUMNS: [&'static str; 7] = ["code", "name", "country", "exchange", "currency", "type", "isin"];
}

impl Persistable for Instruments {
    type Row = MetaRecord;

    const TABLE: &'static str = "exchange";

    fn create_schema(conn: &Connection) -> Result<(), StorageError> {
        let columns: Vec<(&str, &str)> = Self::COLUMNS
            .iter()
            .map(|c| if *c == "code" { (*c, "TEXT NOT NULL") } else { (*c, "TEXT") })
            .collect();
        create_table(conn, Self::TABLE, &columns, &["code"])
    }

    fn upsert(conn: &mut Connection, rows: &[MetaRecord]) -> Result<usize, StorageError> {
        upsert_records(conn, Self::TABLE, &Self::COLUMNS, &["code"], rows)
    }
}
