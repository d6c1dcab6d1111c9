//! Scripted in-memory transport and canned payloads shared by the unit tests.

use crate::account::Account;
use crate::error::{Error, Result};
use crate::transport::{classify_response, method_name, Transport};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

pub const REPORT_SUITES: &str = include_str!("../../test-fixtures/report_suites.json");
pub const METRICS: &str = include_str!("../../test-fixtures/metrics.json");
pub const ELEMENTS: &str = include_str!("../../test-fixtures/elements.json");
pub const SEGMENTS: &str = include_str!("../../test-fixtures/segments.json");
pub const REPORT_QUEUE: &str = include_str!("../../test-fixtures/report_queue.json");
pub const NOT_READY: &str = include_str!("../../test-fixtures/not_ready.json");
pub const METRIC_ID_INVALID: &str = include_str!("../../test-fixtures/metric_id_invalid.json");
pub const RANKED_REPORT: &str = include_str!("../../test-fixtures/ranked_report.json");
pub const TRENDED_REPORT: &str = include_str!("../../test-fixtures/trended_report.json");
pub const OVERTIME_REPORT: &str = include_str!("../../test-fixtures/overtime_report.json");
pub const MULTI_CLASSIFICATIONS: &str =
    include_str!("../../test-fixtures/multi_classifications.json");
pub const MIXED_CLASSIFICATIONS: &str =
    include_str!("../../test-fixtures/mixed_classifications.json");

pub const SUITE_ID: &str = "omniture.api-gateway";

pub fn fixture(text: &str) -> Value {
    serde_json::from_str(text).expect("fixture is valid JSON")
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: String,
    pub body: Value,
}

/// Replays scripted bodies per `Api.Method`.
///
/// A route matching the exact request body wins, then the queue for the
/// method, then its standing reply. Every body goes through
/// [`classify_response`], like a real transport.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<(String, Value, Value)>>,
    queued: Mutex<HashMap<String, VecDeque<Value>>>,
    standing: Mutex<HashMap<String, Value>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new() -> ScriptedTransport {
        ScriptedTransport::default()
    }

    /// Transport answering the catalog calls from the fixtures.
    pub fn with_catalogs() -> ScriptedTransport {
        let transport = ScriptedTransport::new();
        transport.always("Company.GetReportSuites", fixture(REPORT_SUITES));
        transport.always("Report.GetMetrics", fixture(METRICS));
        transport.always("Report.GetElements", fixture(ELEMENTS));
        transport.always("Segments.Get", fixture(SEGMENTS));
        transport
    }

    /// Answer every call to `method` with `body` once the queue is drained.
    pub fn always(&self, method: &str, body: Value) {
        self.standing
            .lock()
            .unwrap()
            .insert(method.to_string(), body);
    }

    /// Answer every call to `method` carrying exactly `request` with `body`.
    pub fn when(&self, method: &str, request: Value, body: Value) {
        self.routes
            .lock()
            .unwrap()
            .push((method.to_string(), request, body));
    }

    /// Answer the next call to `method` with `body`.
    pub fn then(&self, method: &str, body: Value) {
        self.queued
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(body);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.method == method)
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, api: &str, method: &str, body: &Value) -> Result<Value> {
        let name = method_name(api, method);
        self.calls.lock().unwrap().push(Call {
            method: name.clone(),
            body: body.clone(),
        });
        let routed = self
            .routes
            .lock()
            .unwrap()
            .iter()
            .find(|(method, request, _)| *method == name && request == body)
            .map(|(_, _, reply)| reply.clone());
        let queued = routed.or_else(|| {
            self.queued
                .lock()
                .unwrap()
                .get_mut(&name)
                .and_then(VecDeque::pop_front)
        });
        let reply = match queued {
            Some(reply) => reply,
            None => self
                .standing
                .lock()
                .unwrap()
                .get(&name)
                .cloned()
                .ok_or_else(|| Error::UnexpectedResponse(format!("no scripted reply for {}", name)))?,
        };
        classify_response(reply)
    }
}

/// Connected account plus the transport behind it.
pub async fn account() -> (Account, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::with_catalogs());
    let account = Account::connect(transport.clone())
        .await
        .expect("fixture account connects");
    (account, transport)
}
