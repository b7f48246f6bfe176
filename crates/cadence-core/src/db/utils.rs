//! Column conversion helpers shared by the query modules.

use std::{fmt, str::FromStr};

use jiff::Timestamp;
use rusqlite::{types::Type, Row};
use serde::de::DeserializeOwned;

/// Parses a text column through `FromStr`.
pub(super) fn parse_column<T>(row: &Row, index: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw: String = row.get(index)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, format!("{e}").into())
    })
}

/// Parses a timestamp column stored as RFC 3339 text.
pub(super) fn timestamp_column(row: &Row, index: usize) -> rusqlite::Result<Timestamp> {
    parse_column::<Timestamp>(row, index)
}

/// Decodes a JSON text column.
pub(super) fn json_column<T: DeserializeOwned>(row: &Row, index: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(index)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

/// Reads an optional non-negative integer column.
pub(super) fn optional_u64(row: &Row, index: usize) -> rusqlite::Result<Option<u64>> {
    Ok(row.get::<_, Option<i64>>(index)?.map(|v| v.max(0) as u64))
}
