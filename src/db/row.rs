/// Column conversions shared by the query modules.
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDate};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn uuid_at(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

pub fn datetime_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Local>> {
    let raw: String = row.get(idx)?;
    parse_datetime(idx, &raw)
}

pub fn optional_datetime_at(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Local>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| parse_datetime(idx, &raw)).transpose()
}

pub fn optional_date_at(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
        })
    })
    .transpose()
}

/// Reads an enum column stored via its `as_str` form.
pub fn parsed_at<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into()))
}

pub fn seconds_at(row: &Row, idx: usize) -> rusqlite::Result<u64> {
    let raw: i64 = row.get(idx)?;
    u64::try_from(raw).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, raw))
}

fn parse_datetime(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Local>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}
