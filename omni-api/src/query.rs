//! Immutable report query builder.
//!
//! Every `with_*` method leaves `self` untouched and returns a new [`Query`],
//! so one query can serve as a template for several reports. Methods that
//! resolve names through a suite catalog are `async` because the first
//! resolution fetches the catalog; the `*_unchecked` variants skip the
//! catalog and never touch the network.

use crate::account::{CatalogKind, Suite};
use crate::catalog::Selector;
use crate::entry::{Entry, Properties};
use crate::error::{Error, Result};
use crate::protocol::{PollOptions, ReportJob};
use crate::report::ReportResult;
use chrono::NaiveDate;
use omni_utils::dates::{format_date, parse_date, relative_end};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Standard descriptor keys and their data warehouse names.
pub const WAREHOUSE_KEYS: [(&str, &str); 6] = [
    ("metrics", "Metric_List"),
    ("breakdowns", "Breakdown_List"),
    ("dateFrom", "Date_From"),
    ("dateTo", "Date_To"),
    ("date", "Date_Preset"),
    ("dateGranularity", "Date_Granularity"),
];

/// Which wire shape [`Query::build`] produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Standard,
    Warehouse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Granularity {
    pub const ALL: [Granularity; 6] = [
        Granularity::Hour,
        Granularity::Day,
        Granularity::Week,
        Granularity::Month,
        Granularity::Quarter,
        Granularity::Year,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Quarter => "quarter",
            Granularity::Year => "year",
        }
    }
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Granularity::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| {
                let levels = Granularity::ALL
                    .iter()
                    .map(Granularity::as_str)
                    .collect::<Vec<&str>>()
                    .join(", ");
                Error::InvalidOption(format!("Granularity should be one of: {}", levels))
            })
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments of [`Query::with_date_range`].
///
/// Without `months`/`days` the range is `start..=stop` (or just `start`);
/// with them it is relative to `start` and `stop` is ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct DateSpan {
    pub start: NaiveDate,
    pub stop: Option<NaiveDate>,
    pub months: u32,
    pub days: u32,
    pub granularity: Option<Granularity>,
}

impl DateSpan {
    pub fn on(start: NaiveDate) -> DateSpan {
        DateSpan {
            start,
            stop: None,
            months: 0,
            days: 0,
            granularity: None,
        }
    }

    pub fn between(start: NaiveDate, stop: NaiveDate) -> DateSpan {
        DateSpan {
            stop: Some(stop),
            ..DateSpan::on(start)
        }
    }

    /// Parse the dates from text, see [`omni_utils::dates::parse_date`].
    pub fn parse(start: &str, stop: Option<&str>) -> Result<DateSpan> {
        let parse = |s: &str| parse_date(s).map_err(|e| Error::InvalidOption(e.to_string()));
        let start = parse(start)?;
        Ok(match stop {
            Some(stop) => DateSpan::between(start, parse(stop)?),
            None => DateSpan::on(start),
        })
    }

    pub fn months(mut self, months: u32) -> DateSpan {
        self.months = months;
        self
    }

    pub fn days(mut self, days: u32) -> DateSpan {
        self.days = days;
        self
    }

    pub fn granularity(mut self, granularity: Granularity) -> DateSpan {
        self.granularity = Some(granularity);
        self
    }

    /// Inclusive last day of the span.
    pub fn end(&self) -> Result<NaiveDate> {
        if self.months > 0 || self.days > 0 {
            relative_end(&self.start, self.months, self.days).ok_or_else(|| {
                Error::InvalidOption(format!(
                    "{} months and {} days from {} is out of range",
                    self.months, self.days, self.start
                ))
            })
        } else {
            Ok(self.stop.unwrap_or(self.start))
        }
    }
}

/// One of the three ways to add a segment filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// A single segment from the suite's segment catalog
    Segment(Selector),
    /// Several catalog segments, appended together as one filter
    Segments(Vec<Selector>),
    /// A raw filter specification passed through as is
    Inline(Properties),
}

/// Value accepted by [`Query::with_option`].
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Entry(Entry),
    Entries(Vec<Entry>),
    Value(Value),
}

impl OptionValue {
    fn into_value(self) -> Value {
        match self {
            OptionValue::Entry(entry) => entry.serialize(),
            OptionValue::Entries(entries) => {
                Value::Array(entries.iter().map(Entry::serialize).collect())
            }
            OptionValue::Value(value) => value,
        }
    }
}

impl From<Entry> for OptionValue {
    fn from(entry: Entry) -> Self {
        OptionValue::Entry(entry)
    }
}

impl From<Vec<Entry>> for OptionValue {
    fn from(entries: Vec<Entry>) -> Self {
        OptionValue::Entries(entries)
    }
}

impl From<Value> for OptionValue {
    fn from(value: Value) -> Self {
        OptionValue::Value(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Value(Value::from(value))
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Value(Value::Bool(value))
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Value(Value::from(value))
    }
}

/// A pending report request against one suite.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    suite: Suite,
    raw: Properties,
    dialect: Dialect,
}

impl Query {
    pub fn new(suite: &Suite) -> Query {
        let mut raw = Properties::new();
        raw.insert(
            "reportSuiteID".to_string(),
            Value::String(suite.id().to_string()),
        );
        Query {
            suite: suite.clone(),
            raw,
            dialect: Dialect::Standard,
        }
    }

    pub fn suite(&self) -> &Suite {
        &self.suite
    }

    /// The accumulated options, before any dialect translation.
    pub fn raw(&self) -> &Properties {
        &self.raw
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn with_raw(&self, raw: Properties) -> Query {
        Query {
            suite: self.suite.clone(),
            raw,
            dialect: self.dialect,
        }
    }

    fn set(&self, key: &str, value: Value) -> Query {
        let mut raw = self.raw.clone();
        raw.insert(key.to_string(), value);
        self.with_raw(raw)
    }

    fn append(&self, key: &str, value: Value) -> Query {
        let mut raw = self.raw.clone();
        let slot = raw
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        match slot {
            Value::Array(items) => items.push(value),
            other => *other = Value::Array(vec![value]),
        }
        self.with_raw(raw)
    }

    async fn resolve(&self, kind: CatalogKind, selector: Selector) -> Result<Entry> {
        match selector {
            Selector::Entry(entry) => Ok(entry),
            other => self.suite.catalog(kind).await?.resolve(other),
        }
    }

    /// Stand-in entry for an id that is not checked against a catalog.
    fn unchecked(&self, selector: Selector, kind: CatalogKind) -> Result<Entry> {
        match selector {
            Selector::Entry(entry) => Ok(entry),
            Selector::Key(id) => Ok(Entry::new(&id, &id, Some(self.suite.id()))),
            Selector::Position(position) => Err(Error::InvalidOption(format!(
                "position {} needs the {} catalog, it cannot be used unchecked",
                position,
                kind.name()
            ))),
        }
    }

    /// Set the report dates.
    ///
    /// A single day is stored as `date`, anything longer as
    /// `dateFrom`/`dateTo`; switching between the two drops the other form.
    pub fn with_date_range(&self, span: &DateSpan) -> Result<Query> {
        let start = span.start;
        let stop = span.end()?;
        if stop < start {
            return Err(Error::InvalidOption(format!(
                "date range ends ({}) before it starts ({})",
                stop, start
            )));
        }
        let mut raw = self.raw.clone();
        if start == stop {
            raw.remove("dateFrom");
            raw.remove("dateTo");
            raw.insert("date".to_string(), Value::String(format_date(&start)));
        } else {
            raw.remove("date");
            raw.insert("dateFrom".to_string(), Value::String(format_date(&start)));
            raw.insert("dateTo".to_string(), Value::String(format_date(&stop)));
        }
        let query = self.with_raw(raw);
        match span.granularity {
            Some(level) => Ok(query.set("dateGranularity", Value::from(level.as_str()))),
            None => Ok(query),
        }
    }

    /// Set `dateGranularity`; anything outside hour..year is rejected.
    pub fn with_granularity(&self, level: &str) -> Result<Query> {
        let level = level.parse::<Granularity>()?;
        Ok(self.set("dateGranularity", Value::from(level.as_str())))
    }

    /// Add an element; every call after the first is a breakdown one level deeper.
    pub async fn with_element(&self, element: impl Into<Selector>) -> Result<Query> {
        self.with_element_props(element, &Properties::new()).await
    }

    /// Add an element with extra properties (`classification`, `top`, ...).
    pub async fn with_element_props(
        &self,
        element: impl Into<Selector>,
        extra: &Properties,
    ) -> Result<Query> {
        let entry = self.resolve(CatalogKind::Elements, element.into()).await?;
        Ok(self.append("elements", entry.with_properties(extra).serialize()))
    }

    /// Same as [`Query::with_element_props`].
    pub async fn breakdown(
        &self,
        element: impl Into<Selector>,
        extra: &Properties,
    ) -> Result<Query> {
        self.with_element_props(element, extra).await
    }

    /// Add an element without checking the suite's catalog.
    pub fn with_element_unchecked(
        &self,
        element: impl Into<Selector>,
        extra: &Properties,
    ) -> Result<Query> {
        let entry = self.unchecked(element.into(), CatalogKind::Elements)?;
        Ok(self.append("elements", entry.with_properties(extra).serialize()))
    }

    pub async fn with_elements<I, S>(&self, elements: I) -> Result<Query>
    where
        I: IntoIterator<Item = S>,
        S: Into<Selector>,
    {
        let mut query = self.clone();
        for element in elements {
            query = query.with_element(element).await?;
        }
        Ok(query)
    }

    pub async fn with_metric(&self, metric: impl Into<Selector>) -> Result<Query> {
        let entry = self.resolve(CatalogKind::Metrics, metric.into()).await?;
        Ok(self.append("metrics", entry.serialize()))
    }

    pub fn with_metric_unchecked(&self, metric: impl Into<Selector>) -> Result<Query> {
        let entry = self.unchecked(metric.into(), CatalogKind::Metrics)?;
        Ok(self.append("metrics", entry.serialize()))
    }

    pub async fn with_metrics<I, S>(&self, metrics: I) -> Result<Query>
    where
        I: IntoIterator<Item = S>,
        S: Into<Selector>,
    {
        let mut query = self.clone();
        for metric in metrics {
            query = query.with_metric(metric).await?;
        }
        Ok(query)
    }

    /// Add a segment filter.
    pub async fn with_filter(&self, filter: Filter) -> Result<Query> {
        match filter {
            Filter::Segment(selector) => {
                let segment = self.resolve(CatalogKind::Segments, selector).await?;
                Ok(self.append("segments", segment.serialize()))
            }
            Filter::Segments(selectors) => {
                if selectors.is_empty() {
                    return Err(Error::InvalidOption("no segments given".into()));
                }
                let mut segments = Vec::new();
                for selector in selectors {
                    let segment = self.resolve(CatalogKind::Segments, selector).await?;
                    segments.push(segment.serialize());
                }
                Ok(self.append("segments", Value::Array(segments)))
            }
            Filter::Inline(_) => self.with_filter_unchecked(filter),
        }
    }

    /// Add a segment filter without checking the suite's catalog.
    pub fn with_filter_unchecked(&self, filter: Filter) -> Result<Query> {
        match filter {
            Filter::Segment(selector) => {
                let segment = self.unchecked(selector, CatalogKind::Segments)?;
                Ok(self.append("segments", segment.serialize()))
            }
            Filter::Segments(selectors) => {
                if selectors.is_empty() {
                    return Err(Error::InvalidOption("no segments given".into()));
                }
                let segments = selectors
                    .into_iter()
                    .map(|selector| {
                        self.unchecked(selector, CatalogKind::Segments)
                            .map(|segment| segment.serialize())
                    })
                    .collect::<Result<Vec<Value>>>()?;
                Ok(self.append("segments", Value::Array(segments)))
            }
            Filter::Inline(spec) => {
                if spec.is_empty() {
                    return Err(Error::InvalidOption("inline filter is empty".into()));
                }
                Ok(self.append("segments", Value::Object(spec)))
            }
        }
    }

    /// Set any descriptor key the builder has no dedicated method for.
    pub fn with_option(&self, key: &str, value: impl Into<OptionValue>) -> Result<Query> {
        if key.is_empty() {
            return Err(Error::InvalidOption("option key is empty".into()));
        }
        Ok(self.set(key, value.into().into_value()))
    }

    pub fn with_options<I, K, V>(&self, options: I) -> Result<Query>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<OptionValue>,
    {
        let mut options = options.into_iter().peekable();
        if options.peek().is_none() {
            return Err(Error::InvalidOption("no options given".into()));
        }
        options.try_fold(self.clone(), |query, (key, value)| {
            query.with_option(key.as_ref(), value)
        })
    }

    pub fn sort_by(&self, metric: &str) -> Query {
        self.set("sortBy", Value::from(metric))
    }

    pub fn mark_current_data(&self) -> Query {
        self.set("currentData", Value::Bool(true))
    }

    /// Switch to a data warehouse request for `metrics`.
    pub async fn warehouse<I, S>(&self, metrics: I) -> Result<Query>
    where
        I: IntoIterator<Item = S>,
        S: Into<Selector>,
    {
        let mut resolved = Vec::new();
        for metric in metrics {
            let entry = self.resolve(CatalogKind::Metrics, metric.into()).await?;
            resolved.push(entry.serialize());
        }
        Ok(self.into_warehouse(resolved))
    }

    pub fn warehouse_unchecked<I, S>(&self, metrics: I) -> Result<Query>
    where
        I: IntoIterator<Item = S>,
        S: Into<Selector>,
    {
        let resolved = metrics
            .into_iter()
            .map(|metric| {
                self.unchecked(metric.into(), CatalogKind::Metrics)
                    .map(|entry| entry.serialize())
            })
            .collect::<Result<Vec<Value>>>()?;
        Ok(self.into_warehouse(resolved))
    }

    fn into_warehouse(&self, metrics: Vec<Value>) -> Query {
        let mut query = self
            .set("metrics", Value::Array(metrics))
            .set("breakdowns", Value::Bool(false));
        query.dialect = Dialect::Warehouse;
        query
    }

    /// The wire document for this query.
    pub fn build(&self) -> Value {
        match self.dialect {
            Dialect::Standard => {
                let mut document = Properties::new();
                document.insert(
                    "reportDescription".to_string(),
                    Value::Object(self.raw.clone()),
                );
                Value::Object(document)
            }
            Dialect::Warehouse => {
                let translated = self
                    .raw
                    .iter()
                    .map(|(key, value)| (warehouse_name(key).to_string(), value.clone()))
                    .collect::<Properties>();
                Value::Object(translated)
            }
        }
    }

    /// `build()` pretty-printed with four-space indentation.
    pub fn to_json(&self) -> Result<String> {
        pretty_json(&self.build())
    }

    /// An unsubmitted job for this query.
    pub fn job(&self) -> ReportJob {
        ReportJob::new(self.clone())
    }

    /// Submit the query and hand back the queued job.
    pub async fn queue(&self) -> Result<ReportJob> {
        let mut job = self.job();
        job.submit().await?;
        Ok(job)
    }

    /// Submit and wait for the result with default polling.
    pub async fn run(&self) -> Result<ReportResult> {
        self.job().run().await
    }

    pub async fn run_with(&self, options: &PollOptions) -> Result<ReportResult> {
        let mut job = self.job();
        job.submit().await?;
        job.poll(options).await
    }

    /// Rebuild a query for `suite` from text produced by [`Query::to_json`].
    pub fn from_json(suite: &Suite, text: &str) -> Result<Query> {
        let document: Value = serde_json::from_str(text)?;
        Query::from_value(suite, &document)
    }

    /// Rebuild a query from either wire shape.
    ///
    /// Known keys are replayed through the matching `with_*_unchecked`
    /// methods, so no catalog is fetched. Values those methods would not
    /// reproduce exactly are restored verbatim.
    pub fn from_value(suite: &Suite, document: &Value) -> Result<Query> {
        let object = document
            .as_object()
            .ok_or_else(|| Error::InvalidOption("descriptor is not a JSON object".into()))?;
        let (description, dialect) = match object.get("reportDescription") {
            Some(Value::Object(description)) => (description.clone(), Dialect::Standard),
            Some(other) => {
                return Err(Error::InvalidOption(format!(
                    "reportDescription is not an object: {}",
                    other
                )))
            }
            None if is_warehouse(object) => (standard_keys(object), Dialect::Warehouse),
            None => (object.clone(), Dialect::Standard),
        };

        let mut query = Query::new(suite);
        query.dialect = dialect;
        for (key, value) in &description {
            query = match key.as_str() {
                "reportSuiteID" | "date" | "dateFrom" | "dateTo" => query,
                "dateGranularity" => match value.as_str().map(str::parse::<Granularity>) {
                    Some(Ok(level)) => query.set(key, Value::from(level.as_str())),
                    _ => query.with_option(key, value.clone())?,
                },
                "metrics" | "elements" => match replayable(value) {
                    Some(specs) => specs.iter().try_fold(query, |q, spec| {
                        let (id, extra) = split_spec(spec);
                        if key == "metrics" && extra.is_empty() {
                            q.with_metric_unchecked(id)
                        } else if key == "metrics" {
                            let entry = Entry::new(id, id, Some(suite.id())).with_properties(&extra);
                            Ok(q.append("metrics", entry.serialize()))
                        } else {
                            q.with_element_unchecked(id, &extra)
                        }
                    })?,
                    None => query.with_option(key, value.clone())?,
                },
                "segments" => match value.as_array() {
                    Some(specs) if !specs.is_empty() && specs.iter().all(is_filled_object) => {
                        specs.iter().try_fold(query, |q, spec| {
                            let spec = spec.as_object().cloned().unwrap_or_default();
                            q.with_filter_unchecked(Filter::Inline(spec))
                        })?
                    }
                    _ => query.with_option(key, value.clone())?,
                },
                "sortBy" => match value.as_str() {
                    Some(metric) => query.sort_by(metric),
                    None => query.with_option(key, value.clone())?,
                },
                "currentData" if value == &Value::Bool(true) => query.mark_current_data(),
                _ => query.with_option(key, value.clone())?,
            };
        }
        replay_dates(query, &description)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.to_json().map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

/// Pretty-print with four-space indentation.
pub fn pretty_json(value: &Value) -> Result<String> {
    let mut buffer = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(buffer).map_err(|e| Error::Decode(e.to_string()))
}

fn warehouse_name(key: &str) -> &str {
    WAREHOUSE_KEYS
        .iter()
        .find(|(standard, _)| *standard == key)
        .map(|(_, warehouse)| *warehouse)
        .unwrap_or(key)
}

fn standard_name(key: &str) -> &str {
    WAREHOUSE_KEYS
        .iter()
        .find(|(_, warehouse)| *warehouse == key)
        .map(|(standard, _)| *standard)
        .unwrap_or(key)
}

fn is_warehouse(object: &Properties) -> bool {
    WAREHOUSE_KEYS
        .iter()
        .any(|(_, warehouse)| object.contains_key(*warehouse))
}

fn standard_keys(object: &Properties) -> Properties {
    object
        .iter()
        .map(|(key, value)| (standard_name(key).to_string(), value.clone()))
        .collect()
}

fn is_filled_object(value: &Value) -> bool {
    value.as_object().map_or(false, |o| !o.is_empty())
}

/// Entry specs whose `id` is a string, or `None` if any spec is not.
fn replayable(value: &Value) -> Option<&Vec<Value>> {
    let specs = value.as_array()?;
    let all_ids = specs
        .iter()
        .all(|spec| spec.get("id").map_or(false, Value::is_string));
    (all_ids && !specs.is_empty()).then_some(specs)
}

fn split_spec(spec: &Value) -> (&str, Properties) {
    let id = spec.get("id").and_then(Value::as_str).unwrap_or_default();
    let extra = spec
        .as_object()
        .map(|o| {
            o.iter()
                .filter(|(key, _)| key.as_str() != "id")
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default();
    (id, extra)
}

/// A date string that parses and prints back identically.
fn exact_date(value: Option<&Value>) -> Option<NaiveDate> {
    let text = value?.as_str()?;
    let date = parse_date(text).ok()?;
    (format_date(&date) == text).then_some(date)
}

fn replay_dates(query: Query, description: &Properties) -> Result<Query> {
    let single = description.get("date");
    let from = description.get("dateFrom");
    let to = description.get("dateTo");
    let mut query = match (exact_date(single), exact_date(from), exact_date(to)) {
        (Some(day), None, None) if from.is_none() && to.is_none() => {
            query.with_date_range(&DateSpan::on(day))?
        }
        (None, Some(start), Some(stop)) if single.is_none() && start < stop => {
            query.with_date_range(&DateSpan::between(start, stop))?
        }
        _ => query,
    };
    for key in ["date", "dateFrom", "dateTo"] {
        if let Some(value) = description.get(key) {
            if !query.raw.contains_key(key) {
                query = query.set(key, value.clone());
            }
        }
    }
    Ok(query)
}
