//! Submitting queries and waiting for their reports.
//!
//! A [`ReportJob`] moves from `Unsubmitted` to `Queued` on submission and
//! then to `Ready` or `Failed` while polling. Polling sleeps between
//! attempts with a back-off that grows by half each time, capped at
//! [`MAX_INTERVAL_SECS`]. Only the "not ready" answer is retried.

use crate::error::{Error, Result};
use crate::query::{Dialect, Query};
use crate::report::ReportResult;
use futures::future::join_all;
use log::{debug, info};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Ceiling of the poll interval, in seconds.
pub const MAX_INTERVAL_SECS: u64 = 30;

/// Poll intervals: `initial`, then `min(round(previous * 1.5), 30)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    next: u64,
}

impl Backoff {
    /// Starts at `initial_secs`, at least one second.
    pub fn new(initial_secs: u64) -> Backoff {
        Backoff {
            next: initial_secs.max(1),
        }
    }

    /// The interval to wait now; advances to the next one.
    pub fn step(&mut self) -> Duration {
        let current = self.next;
        let grown = (current as f64 * 1.5).round() as u64;
        self.next = grown.min(MAX_INTERVAL_SECS);
        Duration::from_secs(current)
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.step())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollOptions {
    /// First wait before fetching, in seconds
    pub initial_interval: u64,
    /// Give up with [`Error::Timeout`] rather than wait past this
    pub deadline: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        PollOptions {
            initial_interval: 1,
            deadline: None,
        }
    }
}

/// Opaque id the server assigns to a queued report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportId(pub Value);

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Unsubmitted,
    Queued { id: ReportId },
    Ready { id: ReportId },
    Failed { id: Option<ReportId>, reason: String },
}

/// A query paired with its server-side report, once submitted.
#[derive(Debug, Clone)]
pub struct ReportJob {
    query: Query,
    state: JobState,
}

impl ReportJob {
    pub fn new(query: Query) -> ReportJob {
        ReportJob {
            query,
            state: JobState::Unsubmitted,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn id(&self) -> Option<&ReportId> {
        match &self.state {
            JobState::Unsubmitted => None,
            JobState::Queued { id } | JobState::Ready { id } => Some(id),
            JobState::Failed { id, .. } => id.as_ref(),
        }
    }

    /// Queue the report. Does nothing if it already has an id.
    pub async fn submit(&mut self) -> Result<ReportId> {
        if let Some(id) = self.id() {
            return Ok(id.clone());
        }
        let method = match self.query.dialect() {
            Dialect::Standard => "Queue",
            Dialect::Warehouse => "Request",
        };
        let body = self.query.build();
        debug!(
            "Suite: {}  Method: {}  Query: {}",
            self.query.suite().id(),
            method,
            body
        );
        let sent = self.query.suite().request("Report", method, &body).await;
        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                self.state = JobState::Failed {
                    id: None,
                    reason: e.to_string(),
                };
                return Err(e);
            }
        };
        let id = match response.get("reportID") {
            Some(id) if !id.is_null() => ReportId(id.clone()),
            _ => {
                let e = Error::UnexpectedResponse(format!(
                    "Report.{} answered without a reportID: {}",
                    method, response
                ));
                self.state = JobState::Failed {
                    id: None,
                    reason: e.to_string(),
                };
                return Err(e);
            }
        };
        info!("Queued report {} for {}", id, self.query.suite().id());
        self.state = JobState::Queued { id: id.clone() };
        Ok(id)
    }

    pub async fn poll(&mut self, options: &PollOptions) -> Result<ReportResult> {
        self.poll_with(options, || Ok(())).await
    }

    /// Wait for the report, calling `on_tick` before every attempt.
    ///
    /// An error from `on_tick` stops polling and is returned as is; the
    /// job stays queued on the server.
    pub async fn poll_with<F>(&mut self, options: &PollOptions, mut on_tick: F) -> Result<ReportResult>
    where
        F: FnMut() -> Result<()>,
    {
        if self.query.dialect() == Dialect::Warehouse {
            return Err(Error::Unsupported(
                "data warehouse reports are delivered out of band and cannot be polled".into(),
            ));
        }
        let id = self.id().cloned().ok_or(Error::NotSubmitted)?;
        let suite = self.query.suite().clone();
        let body = json!({ "reportID": id.0 });
        let started = Instant::now();
        let mut backoff = Backoff::new(options.initial_interval);
        loop {
            on_tick()?;
            let interval = backoff.step();
            if let Some(deadline) = options.deadline {
                if started.elapsed() + interval > deadline {
                    return Err(Error::Timeout(deadline));
                }
            }
            debug!("Check Interval: {} seconds", interval.as_secs());
            sleep(interval).await;

            let fetched = match suite.request("Report", "Get", &body).await {
                Ok(payload) => ReportResult::from_payload(payload, Some(suite.id())),
                Err(e) if e.is_not_ready() => {
                    debug!("Report {} not ready", id);
                    continue;
                }
                Err(e) => Err(e),
            };
            let resolved = match fetched {
                Ok(mut report) => {
                    let resolved = report.resolve_segments(&suite).await;
                    resolved.map(|_| report)
                }
                Err(e) => Err(e),
            };
            return match resolved {
                Ok(report) => {
                    info!("Report {} ready: {}", id, report);
                    self.state = JobState::Ready { id };
                    Ok(report)
                }
                Err(e) => {
                    self.state = JobState::Failed {
                        id: Some(id),
                        reason: e.to_string(),
                    };
                    Err(e)
                }
            };
        }
    }

    /// Submit and poll with default options, logging each attempt.
    pub async fn run(&mut self) -> Result<ReportResult> {
        let id = self.submit().await?;
        let mut attempts = 0u32;
        let progress = move || {
            attempts += 1;
            debug!("Waiting for report {} (check {})", id, attempts);
            Ok(())
        };
        self.poll_with(&PollOptions::default(), progress).await
    }

    /// Ask the server to drop the report.
    pub async fn cancel(&self) -> Result<Value> {
        let id = self.id().ok_or(Error::NotSubmitted)?;
        let suite = self.query.suite();
        match self.query.dialect() {
            Dialect::Standard => {
                suite
                    .request("Report", "CancelReport", &json!({ "reportID": id.0 }))
                    .await
            }
            Dialect::Warehouse => {
                suite
                    .request("DataWarehouse", "CancelRequest", &json!({ "Request_Id": id.0 }))
                    .await
            }
        }
    }
}

/// Submit every job concurrently; one result per job, in order.
pub async fn queue_all(jobs: &mut [ReportJob]) -> Vec<Result<ReportId>> {
    join_all(jobs.iter_mut().map(|job| job.submit())).await
}

/// Submit and poll every job concurrently; a failing job does not affect the others.
pub async fn sync_all(jobs: &mut [ReportJob], options: &PollOptions) -> Vec<Result<ReportResult>> {
    join_all(jobs.iter_mut().map(|job| async move {
        match job.submit().await {
            Ok(_) => job.poll(options).await,
            Err(e) => Err(e),
        }
    }))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        account, fixture, METRIC_ID_INVALID, NOT_READY, RANKED_REPORT, REPORT_QUEUE, SUITE_ID,
        TRENDED_REPORT,
    };
    use crate::testing::ScriptedTransport;
    use std::sync::Arc;

    async fn job() -> (ReportJob, Arc<ScriptedTransport>) {
        let (account, transport) = account().await;
        transport.always("Report.Queue", fixture(REPORT_QUEUE));
        transport.always("Report.Get", fixture(RANKED_REPORT));
        let query = account
            .suite(SUITE_ID)
            .unwrap()
            .report()
            .with_element_unchecked("page", &Default::default())
            .unwrap()
            .with_metric_unchecked("pageviews")
            .unwrap();
        (query.job(), transport)
    }

    fn secs(backoff: Backoff, n: usize) -> Vec<u64> {
        backoff.take(n).map(|d| d.as_secs()).collect()
    }

    #[test]
    fn test_backoff_sequence() {
        assert_eq!(
            secs(Backoff::new(1), 10),
            vec![1, 2, 3, 5, 8, 12, 18, 27, 30, 30]
        );
        assert_eq!(secs(Backoff::new(0), 2), vec![1, 2]);
        assert_eq!(secs(Backoff::new(60), 3), vec![60, 30, 30]);
        assert_eq!(secs(Backoff::new(4), 3), vec![4, 6, 9]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_is_idempotent() {
        let (mut job, transport) = job().await;
        assert_eq!(job.state(), &JobState::Unsubmitted);
        let first = job.submit().await.unwrap();
        let second = job.submit().await.unwrap();
        assert_eq!(first, ReportId(json!(123456789)));
        assert_eq!(first, second);
        assert_eq!(transport.count("Report.Queue"), 1);
        let call = transport
            .calls()
            .into_iter()
            .find(|c| c.method == "Report.Queue")
            .unwrap();
        assert_eq!(call.body, job.query().build());
        assert_eq!(first.to_string(), "123456789");
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_without_report_id_fails_the_job() {
        let (mut job, transport) = job().await;
        transport.then("Report.Queue", json!({"status": "queued"}));
        let err = job.submit().await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
        match job.state() {
            JobState::Failed { id, reason } => {
                assert_eq!(id, &None);
                assert_eq!(reason, &err.to_string());
            }
            other => panic!("expected a failed job, got {:?}", other),
        }
        assert!(job.id().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_retries_while_not_ready() {
        let (mut job, transport) = job().await;
        transport.then("Report.Get", fixture(NOT_READY));
        transport.then("Report.Get", fixture(NOT_READY));
        job.submit().await.unwrap();
        let started = Instant::now();
        let report = job.poll(&PollOptions::default()).await.unwrap();
        // slept 1 + 2 + 3 seconds
        assert_eq!(started.elapsed().as_secs(), 6);
        assert_eq!(transport.count("Report.Get"), 3);
        assert_eq!(report.rows().unwrap().len(), 3);
        assert!(matches!(job.state(), JobState::Ready { .. }));
        let get = transport.calls().into_iter().last().unwrap();
        assert_eq!(get.body, json!({"reportID": 123456789}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_descriptor_is_not_retried() {
        let (mut job, transport) = job().await;
        transport.then("Report.Get", fixture(NOT_READY));
        transport.then("Report.Get", fixture(METRIC_ID_INVALID));
        job.submit().await.unwrap();
        let err = job.poll(&PollOptions::default()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "metric_id_invalid: Metric \"bad_metric\" not valid (https://marketing.adobe.com/developer/en_US/documentation/analytics-reporting-1-4/metrics)"
        );
        assert_eq!(transport.count("Report.Get"), 2);
        match job.state() {
            JobState::Failed { id, reason } => {
                assert_eq!(id, &Some(ReportId(json!(123456789))));
                assert!(reason.starts_with("metric_id_invalid"));
            }
            other => panic!("expected a failed job, got {:?}", other),
        }
        // still known to the server
        assert!(job.id().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_tick_runs_per_attempt_and_can_abort() {
        let (mut job, transport) = job().await;
        transport.always("Report.Get", fixture(NOT_READY));
        job.submit().await.unwrap();
        let mut ticks = 0;
        let err = job
            .poll_with(&PollOptions::default(), || {
                ticks += 1;
                if ticks == 3 {
                    Err(Error::Aborted("user gave up".into()))
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Aborted(_)));
        assert_eq!(ticks, 3);
        assert_eq!(transport.count("Report.Get"), 2);
        assert!(matches!(job.state(), JobState::Queued { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline() {
        let (mut job, transport) = job().await;
        transport.always("Report.Get", fixture(NOT_READY));
        job.submit().await.unwrap();
        let options = PollOptions {
            initial_interval: 1,
            deadline: Some(Duration::from_secs(10)),
        };
        let err = job.poll(&options).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_secs(10)));
        // waits of 1, 2 and 3 fit, the next one of 5 would not
        assert_eq!(transport.count("Report.Get"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubmitted_job() {
        let (mut job, transport) = job().await;
        assert!(matches!(
            job.poll(&PollOptions::default()).await,
            Err(Error::NotSubmitted)
        ));
        assert!(matches!(job.cancel().await, Err(Error::NotSubmitted)));
        assert_eq!(transport.count("Report.Get"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let (mut job, transport) = job().await;
        transport.always("Report.CancelReport", json!(true));
        job.submit().await.unwrap();
        assert_eq!(job.cancel().await.unwrap(), json!(true));
        let call = transport.calls().into_iter().last().unwrap();
        assert_eq!(call.method, "Report.CancelReport");
        assert_eq!(call.body, json!({"reportID": 123456789}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_warehouse_job() {
        let (job, transport) = job().await;
        transport.always("Report.Request", json!({"reportID": "dw-42"}));
        transport.always("DataWarehouse.CancelRequest", json!(true));
        let mut job = job.query().warehouse_unchecked(["pageviews"]).unwrap().job();
        let id = job.submit().await.unwrap();
        assert_eq!(id.to_string(), "dw-42");
        assert_eq!(transport.count("Report.Request"), 1);
        assert_eq!(transport.count("Report.Queue"), 0);
        assert!(matches!(
            job.poll(&PollOptions::default()).await,
            Err(Error::Unsupported(_))
        ));
        job.cancel().await.unwrap();
        let call = transport.calls().into_iter().last().unwrap();
        assert_eq!(call.method, "DataWarehouse.CancelRequest");
        assert_eq!(call.body, json!({"Request_Id": "dw-42"}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_resolves_segments() {
        let (job, transport) = job().await;
        transport.always("Report.Get", fixture(TRENDED_REPORT));
        let mut job = job;
        let report = job.run().await.unwrap();
        let segments = report.segments.as_ref().unwrap();
        assert_eq!(segments[0].title, "All Visits");
        assert_eq!(report.rows().unwrap()[0]["page"].to_string(), "Home");
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_isolate_failures() {
        let (job, transport) = job().await;
        let good = job.query().clone();
        let bad = good.with_metric_unchecked("bad_metric").unwrap();
        transport.when("Report.Queue", good.build(), json!({"reportID": 1}));
        transport.when("Report.Queue", bad.build(), json!({"reportID": 2}));
        transport.when("Report.Get", json!({"reportID": 1}), fixture(RANKED_REPORT));
        transport.when("Report.Get", json!({"reportID": 2}), fixture(METRIC_ID_INVALID));

        let mut jobs = vec![good.job(), bad.job()];
        let ids = queue_all(&mut jobs).await;
        assert_eq!(ids[0].as_ref().unwrap(), &ReportId(json!(1)));
        assert_eq!(ids[1].as_ref().unwrap(), &ReportId(json!(2)));

        let results = sync_all(&mut jobs, &PollOptions::default()).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().rows().unwrap().len(), 3);
        assert!(matches!(
            results[1],
            Err(Error::InvalidDescriptor { ref error, .. }) if error == "metric_id_invalid"
        ));
        // already queued, so no second submission
        assert_eq!(transport.count("Report.Queue"), 2);
    }
}
