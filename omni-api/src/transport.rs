//! The single network boundary of the client.
//!
//! Every call to the reporting service goes through [`Transport::send`]. The
//! real implementation lives in [`crate::http`]; tests substitute a scripted
//! one, and [`crate::cache::CachedTransport`] wraps either.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Error code the service returns while a queued report is still running.
pub const NOT_READY: &str = "report_not_ready";

/// Authenticated request primitive.
///
/// Implementations must sign every request afresh and must map the decoded
/// body through [`classify_response`] so that callers see
/// [`Error::NotReady`] and [`Error::InvalidDescriptor`] consistently.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Call `api.method` (e.g. `Report.Queue`) with a JSON body.
    async fn send(&self, api: &str, method: &str, body: &Value) -> Result<Value>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, api: &str, method: &str, body: &Value) -> Result<Value> {
        (**self).send(api, method, body).await
    }
}

/// `Api.Method` as used on the wire.
pub fn method_name(api: &str, method: &str) -> String {
    format!("{}.{}", api, method)
}

/// Apply the service's error-field convention to a decoded body.
///
/// Objects whose `error` is the not-ready sentinel become [`Error::NotReady`],
/// any other non-null `error` becomes [`Error::InvalidDescriptor`], and
/// everything else (including non-object bodies) passes through unchanged.
pub fn classify_response(body: Value) -> Result<Value> {
    match body.get("error") {
        None | Some(Value::Null) => Ok(body),
        Some(Value::String(code)) if code == NOT_READY => Err(Error::NotReady),
        Some(_) => Err(Error::from_server(&body)),
    }
}
