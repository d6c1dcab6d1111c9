use crate::account::Suite;
use crate::catalog::Catalog;
use crate::decode::{decode, Row};
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::query::pretty_json;
use log::debug;
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Report shape the server chose for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    Ranked,
    Trended,
    Overtime,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Ranked => "ranked",
            ReportType::Trended => "trended",
            ReportType::Overtime => "overtime",
        }
    }
}

impl FromStr for ReportType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ranked" => Ok(ReportType::Ranked),
            "trended" => Ok(ReportType::Trended),
            "overtime" => Ok(ReportType::Overtime),
            other => Err(Error::UnexpectedResponse(format!(
                "unknown report type {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Seconds the report spent queued and running on the server.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Timing {
    pub queue: f64,
    pub execution: f64,
}

/// A finished report.
///
/// Rows are decoded on first access and kept for the life of the value.
#[derive(Debug)]
pub struct ReportResult {
    raw: Value,
    pub timing: Timing,
    pub metrics: Catalog<Entry>,
    pub elements: Catalog<Entry>,
    pub period: String,
    pub report_type: ReportType,
    /// Segments applied by the server, if any
    pub segments: Option<Vec<Entry>>,
    rows: OnceCell<Vec<Row>>,
}

impl ReportResult {
    /// Read the derived fields out of a `Report.Get` payload.
    pub fn from_payload(raw: Value, scope: Option<&str>) -> Result<ReportResult> {
        let report = raw
            .get("report")
            .filter(|r| r.is_object())
            .ok_or_else(|| Error::UnexpectedResponse("report payload has no `report`".into()))?;
        let timing = Timing {
            queue: seconds(&raw, "waitSeconds")?,
            execution: seconds(&raw, "runSeconds")?,
        };
        debug!(
            "Report Wait Time: {}, Report Execution Time: {}",
            timing.queue, timing.execution
        );
        let listing = |field: &str| {
            report.get(field).ok_or_else(|| {
                Error::UnexpectedResponse(format!("report payload has no `{}`", field))
            })
        };
        let metrics = Entry::list("metrics", listing("metrics")?, scope, "name", "id")?;
        let elements = Entry::list("elements", listing("elements")?, scope, "name", "id")?;
        let report_type = listing("type")?
            .as_str()
            .ok_or_else(|| Error::UnexpectedResponse("report type is not a string".into()))?
            .parse::<ReportType>()?;
        let period = match report.get("period") {
            Some(Value::String(period)) => period.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let segments = match report.get("segments") {
            Some(listed) if listed.as_array().map_or(false, |items| !items.is_empty()) => {
                Some(Entry::list("segments", listed, scope, "name", "id")?.into_vec())
            }
            _ => None,
        };
        Ok(ReportResult {
            raw,
            timing,
            metrics,
            elements,
            period,
            report_type,
            segments,
            rows: OnceCell::new(),
        })
    }

    /// Swap the payload's segments for the suite's catalog entries where known.
    pub async fn resolve_segments(&mut self, suite: &Suite) -> Result<()> {
        let reported = match &self.segments {
            Some(reported) => reported.clone(),
            None => return Ok(()),
        };
        let catalog = suite.segments().await?;
        let resolved = reported
            .into_iter()
            .map(|segment| {
                catalog
                    .iter()
                    .find(|known| known.id == segment.id)
                    .cloned()
                    .unwrap_or(segment)
            })
            .collect();
        self.segments = Some(resolved);
        Ok(())
    }

    /// Flat rows, one per leaf of the report tree.
    pub fn rows(&self) -> Result<&[Row]> {
        self.rows
            .get_or_try_init(|| {
                decode(
                    &self.raw["report"]["data"],
                    self.report_type,
                    &self.elements,
                    &self.metrics,
                )
            })
            .map(Vec::as_slice)
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn to_json(&self) -> Result<String> {
        pretty_json(&self.raw)
    }
}

impl fmt::Display for ReportResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids = |catalog: &Catalog<Entry>| {
            catalog
                .iter()
                .map(|entry| entry.id.as_str())
                .collect::<Vec<&str>>()
                .join(", ")
        };
        write!(
            f,
            "Report (metrics) {} (elements) {}",
            ids(&self.metrics),
            ids(&self.elements)
        )
    }
}

/// A number of seconds sent either as a number or as text; absent means zero.
fn seconds(raw: &Value, field: &str) -> Result<f64> {
    match raw.get(field) {
        None | Some(Value::Null) => Ok(0.0),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| Error::UnexpectedResponse(format!("{} is out of range", field))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| Error::UnexpectedResponse(format!("{} is not a number: {:?}", field, s))),
        Some(other) => Err(Error::UnexpectedResponse(format!(
            "{} is not a number: {}",
            field, other
        ))),
    }
}
