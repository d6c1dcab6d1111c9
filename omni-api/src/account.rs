use crate::catalog::{Addressable, Catalog, LookupKey};
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::query::Query;
use crate::transport::Transport;
use log::{debug, info};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// The three per-suite listings a query is validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Metrics,
    Elements,
    Segments,
}

impl CatalogKind {
    pub fn name(&self) -> &'static str {
        match self {
            CatalogKind::Metrics => "metrics",
            CatalogKind::Elements => "elements",
            CatalogKind::Segments => "segments",
        }
    }

    fn request(&self, suite_id: &str) -> (&'static str, &'static str, Value) {
        match self {
            CatalogKind::Metrics => ("Report", "GetMetrics", json!({"reportSuiteID": suite_id})),
            CatalogKind::Elements => (
                "Report",
                "GetElements",
                json!({"reportSuiteID": suite_id, "reportType": "warehouse"}),
            ),
            CatalogKind::Segments => ("Segments", "Get", json!({"accessLevel": "shared"})),
        }
    }
}

/// Entry point: the list of report suites reachable with one set of credentials.
#[derive(Clone)]
pub struct Account {
    transport: Arc<dyn Transport>,
    suites: Catalog<Suite>,
}

impl Account {
    /// Fetch the report suites visible to the caller.
    pub async fn connect(transport: Arc<dyn Transport>) -> Result<Account> {
        let body = transport
            .send("Company", "GetReportSuites", &json!({}))
            .await?;
        let listing = body.get("report_suites").ok_or_else(|| {
            Error::UnexpectedResponse("Company.GetReportSuites has no `report_suites`".into())
        })?;
        let entries = Entry::list("report suites", listing, None, "site_title", "rsid")?;
        let suites = entries
            .iter()
            .map(|entry| Suite::new(&entry.id, &entry.title, transport.clone()))
            .collect::<Vec<Suite>>();
        info!("Found {} report suites", suites.len());
        Ok(Account {
            transport,
            suites: Catalog::new("report suites", suites),
        })
    }

    /// Build an HTTP-backed account, wrapped in the file cache when one is configured.
    #[cfg(feature = "api")]
    pub async fn from_config(config: &crate::config::AccountConfig) -> Result<Account> {
        let http = crate::http::HttpTransport::from_config(config)?;
        let transport: Arc<dyn Transport> = match &config.cache {
            Some(cache) => Arc::new(crate::cache::CachedTransport::new(http, cache.clone())),
            None => Arc::new(http),
        };
        Account::connect(transport).await
    }

    pub fn suites(&self) -> &Catalog<Suite> {
        &self.suites
    }

    /// A report suite by position, rsid or title.
    pub fn suite(&self, key: impl Into<LookupKey>) -> Result<Suite> {
        self.suites.lookup(key).cloned()
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// Rebuild a query from a serialized descriptor, picking the suite it names.
    pub fn query_from_json(&self, text: &str) -> Result<Query> {
        let document: Value = serde_json::from_str(text)?;
        let description = document.get("reportDescription").unwrap_or(&document);
        let suite_id = description
            .get("reportSuiteID")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidOption("descriptor has no reportSuiteID".into()))?;
        let suite = self.suite(suite_id)?;
        Query::from_value(&suite, &document)
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("suites", &self.suites)
            .finish()
    }
}

struct SuiteInner {
    id: String,
    title: String,
    transport: Arc<dyn Transport>,
    metrics: OnceCell<Catalog<Entry>>,
    elements: OnceCell<Catalog<Entry>>,
    segments: OnceCell<Catalog<Entry>>,
}

/// A report suite. Cheap to clone; clones share the memoized catalogs.
#[derive(Clone)]
pub struct Suite {
    inner: Arc<SuiteInner>,
}

impl Suite {
    pub fn new(id: &str, title: &str, transport: Arc<dyn Transport>) -> Suite {
        Suite {
            inner: Arc::new(SuiteInner {
                id: id.to_string(),
                title: title.to_string(),
                transport,
                metrics: OnceCell::new(),
                elements: OnceCell::new(),
                segments: OnceCell::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn title(&self) -> &str {
        &self.inner.title
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    /// Send a call on behalf of this suite.
    pub async fn request(&self, api: &str, method: &str, body: &Value) -> Result<Value> {
        self.inner.transport.send(api, method, body).await
    }

    pub async fn metrics(&self) -> Result<&Catalog<Entry>> {
        self.catalog(CatalogKind::Metrics).await
    }

    pub async fn elements(&self) -> Result<&Catalog<Entry>> {
        self.catalog(CatalogKind::Elements).await
    }

    pub async fn segments(&self) -> Result<&Catalog<Entry>> {
        self.catalog(CatalogKind::Segments).await
    }

    /// A memoized catalog. Concurrent first callers share a single fetch.
    pub async fn catalog(&self, kind: CatalogKind) -> Result<&Catalog<Entry>> {
        let cell = match kind {
            CatalogKind::Metrics => &self.inner.metrics,
            CatalogKind::Elements => &self.inner.elements,
            CatalogKind::Segments => &self.inner.segments,
        };
        cell.get_or_try_init(|| self.fetch(kind)).await
    }

    async fn fetch(&self, kind: CatalogKind) -> Result<Catalog<Entry>> {
        let (api, method, body) = kind.request(self.id());
        debug!("Loading {} for {}", kind.name(), self.id());
        let listing = self.request(api, method, &body).await?;
        Entry::list(kind.name(), &listing, Some(self.id()), "name", "id")
    }

    /// An empty query against this suite.
    pub fn report(&self) -> Query {
        Query::new(self)
    }
}

impl Addressable for Suite {
    fn id(&self) -> &str {
        &self.inner.id
    }
    fn title(&self) -> &str {
        &self.inner.title
    }
}

impl PartialEq for Suite {
    fn eq(&self, other: &Suite) -> bool {
        self.inner.id == other.inner.id
    }
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suite")
            .field("id", &self.inner.id)
            .field("title", &self.inner.title)
            .finish()
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID {:25} | Name: {}", self.inner.id, self.inner.title)
    }
}
