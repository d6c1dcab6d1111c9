//! Client for the Adobe Analytics (Omniture) 1.4 reporting API.
//!
//! Build a [`Query`] against a [`Suite`], submit it as a [`ReportJob`], poll
//! until the server has the report, and read the decoded rows from the
//! [`ReportResult`]. All network traffic goes through a [`Transport`].

pub mod account;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod decode;
pub mod entry;
pub mod error;
#[cfg(feature = "api")]
pub mod http;
pub mod protocol;
pub mod query;
pub mod report;
pub mod transport;
pub mod wsse;

#[cfg(test)]
pub(crate) mod testing;

pub use account::{Account, CatalogKind, Suite};
pub use cache::CachedTransport;
pub use catalog::{Addressable, Catalog, LookupKey, Selector};
pub use config::{AccountConfig, CacheConfig, Credentials};
pub use decode::{Cell, Row};
pub use entry::{Entry, Properties};
pub use error::{Error, Result};
#[cfg(feature = "api")]
pub use http::HttpTransport;
pub use protocol::{queue_all, sync_all, Backoff, JobState, PollOptions, ReportId, ReportJob};
pub use query::{DateSpan, Dialect, Filter, Granularity, OptionValue, Query};
pub use report::{ReportResult, ReportType, Timing};
pub use transport::{classify_response, Transport};
