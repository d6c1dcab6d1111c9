/// Error types for the reporting client
use std::time::Duration;
use thiserror::Error;

/// Main error type for reporting operations
#[derive(Error, Debug)]
pub enum Error {
    /// A builder or entry option was rejected locally
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// Nothing in a catalog matched the key
    #[error("Cannot find {key} among the available {catalog}")]
    NotFound { key: String, catalog: String },

    /// More than one catalog entry matched the key by id or title
    #[error("Found multiple matches for {key}: {}. Use the identifier instead.", .matches.join(", "))]
    AmbiguousKey { key: String, matches: Vec<String> },

    /// The server has not finished the report yet
    #[error("Report Not Ready")]
    NotReady,

    /// The server rejected the request, fields are passed through verbatim
    #[error("{error}: {description} ({uri})")]
    InvalidDescriptor {
        error: String,
        description: String,
        uri: String,
    },

    /// A report payload could not be flattened
    #[error("Failed to decode report: {0}")]
    Decode(String),

    /// The server answered with something other than the documented shape
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The job has no server-assigned id yet
    #[error("Report has not been submitted")]
    NotSubmitted,

    /// The operation is not available for this kind of report
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Polling ran past the caller's deadline
    #[error("Report not ready after {0:?}")]
    Timeout(Duration),

    /// A progress callback asked to stop polling
    #[error("Polling aborted: {0}")]
    Aborted(String),

    /// Configuration is missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP request failed
    #[cfg(feature = "api")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization failed
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing the response cache failed
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build an [`Error::InvalidDescriptor`] from a server error document.
    ///
    /// Missing fields render as empty strings so the message shape stays fixed.
    pub fn from_server(document: &serde_json::Value) -> Error {
        let field = |name: &str| match document.get(name) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        Error::InvalidDescriptor {
            error: field("error"),
            description: field("error_description"),
            uri: field("error_uri"),
        }
    }

    /// True for the transient "not ready" condition that drives polling.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Error::NotReady)
    }
}

/// Type alias for Results using the crate [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::Error;
    use serde_json::json;

    #[test]
    fn test_invalid_descriptor_message() {
        let err = Error::from_server(&json!({
            "error": "metric_id_invalid",
            "error_description": "Metric \"bad_metric\" not valid",
            "error_uri": "https://marketing.adobe.com/developer/en_US/documentation/analytics-reporting-1-4/metrics"
        }));
        assert_eq!(
            err.to_string(),
            "metric_id_invalid: Metric \"bad_metric\" not valid (https://marketing.adobe.com/developer/en_US/documentation/analytics-reporting-1-4/metrics)"
        );
    }

    #[test]
    fn test_invalid_descriptor_missing_uri() {
        let err = Error::from_server(&json!({
            "error": "segment_invalid",
            "error_description": "Segment \"bad_segment\" not valid",
            "error_uri": null
        }));
        assert_eq!(
            err.to_string(),
            "segment_invalid: Segment \"bad_segment\" not valid ()"
        );
    }

    #[test]
    fn test_catalog_messages() {
        let not_found = Error::NotFound {
            key: "pages".into(),
            catalog: "elements".into(),
        };
        assert_eq!(
            not_found.to_string(),
            "Cannot find pages among the available elements"
        );
        let ambiguous = Error::AmbiguousKey {
            key: "Visits".into(),
            matches: vec!["visits".into(), "visits_2".into()],
        };
        assert_eq!(
            ambiguous.to_string(),
            "Found multiple matches for Visits: visits, visits_2. Use the identifier instead."
        );
        assert!(Error::NotReady.is_not_ready());
        assert_eq!(Error::NotReady.to_string(), "Report Not Ready");
    }
}
