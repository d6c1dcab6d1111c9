//! Flattening of the nested `report.data` tree into one row per leaf.

use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::report::ReportType;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Key of the synthetic time dimension.
pub const DATETIME: &str = "datetime";

/// Raw `name` of a time node, kept next to the parsed timestamp.
pub const DATETIME_FRIENDLY: &str = "datetime_friendly";

/// One decoded value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Integer(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Integer(n) => write!(f, "{}", n),
            Cell::Float(n) => write!(f, "{}", n),
            Cell::Text(s) => f.write_str(s),
            Cell::DateTime(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// A flat row: dimension and metric keys to values.
pub type Row = BTreeMap<String, Cell>;

/// Column name for an element, qualified by its classification if it has one.
pub fn column(element: &Entry) -> String {
    match element.classification() {
        Some(classification) => format!("{} | {}", element.id, classification),
        None => element.id.clone(),
    }
}

/// Coerce a raw count for a metric with `decimals` declared places.
pub fn coerce(raw: &str, decimals: u32) -> Result<Cell> {
    let text = raw.trim();
    if decimals > 0 || text.contains('.') {
        text.parse::<f64>()
            .map(Cell::Float)
            .map_err(|e| Error::Decode(format!("count {:?} is not a number: {}", raw, e)))
    } else {
        text.parse::<i64>()
            .map(Cell::Integer)
            .map_err(|e| Error::Decode(format!("count {:?} is not an integer: {}", raw, e)))
    }
}

/// Decode `data` against the ordered elements and metrics of its report.
pub fn decode(
    data: &Value,
    report_type: ReportType,
    elements: &[Entry],
    metrics: &[Entry],
) -> Result<Vec<Row>> {
    let decoder = Decoder {
        trended: report_type == ReportType::Trended,
        elements,
        metrics,
    };
    let mut rows = Vec::new();
    decoder.walk(data, 0, &Row::new(), &mut rows)?;
    Ok(rows)
}

struct Decoder<'a> {
    trended: bool,
    elements: &'a [Entry],
    metrics: &'a [Entry],
}

impl Decoder<'_> {
    fn walk(&self, node: &Value, level: usize, upper: &Row, rows: &mut Vec<Row>) -> Result<()> {
        match node {
            Value::Array(siblings) => {
                for sibling in siblings {
                    self.walk(sibling, level, upper, rows)?;
                }
                Ok(())
            }
            Value::Object(record) => self.record(record, level, upper, rows),
            other => Err(Error::Decode(format!(
                "expected a node or a list of nodes at level {}, got {}",
                level, other
            ))),
        }
    }

    fn record(
        &self,
        record: &Map<String, Value>,
        level: usize,
        upper: &Row,
        rows: &mut Vec<Row>,
    ) -> Result<()> {
        let mut row = upper.clone();
        let key = self.key(level)?;
        if key == DATETIME {
            row.insert(DATETIME.to_string(), Cell::DateTime(timestamp(record)?));
            row.insert(DATETIME_FRIENDLY.to_string(), Cell::Text(name(record)));
        } else {
            row.insert(key, Cell::Text(name(record)));
        }

        if let Some(Value::Array(children)) = record.get("breakdown") {
            if !children.is_empty() {
                for child in children {
                    self.walk(child, level + 1, &row, rows)?;
                }
                return Ok(());
            }
        }
        match record.get("counts") {
            Some(Value::Array(counts)) => {
                if counts.len() > self.metrics.len() {
                    return Err(Error::Decode(format!(
                        "{} counts for {} metrics",
                        counts.len(),
                        self.metrics.len()
                    )));
                }
                for (count, metric) in counts.iter().zip(self.metrics) {
                    let raw = match count {
                        Value::String(s) => s.clone(),
                        Value::Number(n) => n.to_string(),
                        other => {
                            return Err(Error::Decode(format!(
                                "count for {} is not a number: {}",
                                metric.id, other
                            )))
                        }
                    };
                    row.insert(metric.id.clone(), coerce(&raw, metric.decimals())?);
                }
                rows.push(row);
                Ok(())
            }
            Some(other) => Err(Error::Decode(format!("counts is not a list: {}", other))),
            None => Err(Error::Decode(format!(
                "node {:?} at level {} has neither breakdown nor counts",
                name(record),
                level
            ))),
        }
    }

    /// Column decoded at `level`; level 0 of a trended report is time.
    fn key(&self, level: usize) -> Result<String> {
        if self.trended && level == 0 {
            return Ok(DATETIME.to_string());
        }
        let index = if self.trended { level - 1 } else { level };
        self.elements
            .get(index)
            .map(column)
            .ok_or_else(|| Error::Decode(format!("no element for breakdown level {}", level)))
    }
}

/// `name` as text, or `"null"` when absent or not a string.
fn name(record: &Map<String, Value>) -> String {
    match record.get("name") {
        Some(Value::String(s)) => s.clone(),
        _ => "null".to_string(),
    }
}

fn timestamp(record: &Map<String, Value>) -> Result<NaiveDateTime> {
    let part = |field: &str| -> Result<Option<i64>> {
        match record.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| Error::Decode(format!("{} is not an integer: {}", field, n))),
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| Error::Decode(format!("{} is not an integer: {:?}", field, s))),
            Some(other) => Err(Error::Decode(format!("{} is not an integer: {}", field, other))),
        }
    };
    let year = part("year")?
        .ok_or_else(|| Error::Decode("time node has no year".into()))?;
    let month = part("month")?.unwrap_or(1);
    let day = part("day")?.unwrap_or(1);
    let hour = part("hour")?.unwrap_or(0);
    i32::try_from(year)
        .ok()
        .zip(u32::try_from(month).ok())
        .zip(u32::try_from(day).ok())
        .and_then(|((y, m), d)| NaiveDate::from_ymd_opt(y, m, d))
        .and_then(|date| date.and_hms_opt(u32::try_from(hour).ok()?, 0, 0))
        .ok_or_else(|| {
            Error::Decode(format!(
                "invalid timestamp {}-{}-{} {}:00",
                year, month, day, hour
            ))
        })
}
