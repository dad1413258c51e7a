//! Replication orchestrator
//!
//! Drives one iterator per request descriptor, strictly one after the other,
//! feeds every successful page to the scorer and finally writes the
//! consolidated availability report.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};

use super::iterator::ReplicationIterator;
use super::request::RequestDescriptor;
use super::writer::{DirectoryPageWriter, JsonReportWriter, PageWriter, ReportWriter};
use crate::api::AuthProvider;
use crate::availability::{AvailabilityAccumulator, AvailabilityReport, consolidate, score_page};
use crate::config::ReplicationConfig;
use crate::error::Result;

/// Why replication of a descriptor ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No more records (or the strategy stopped advancing)
    Completed,
    /// The client-side record limit was reached
    LimitReached,
    /// Too many consecutive failed requests
    ErrorBudgetExhausted,
}

/// Outcome of replicating one descriptor
#[derive(Debug, Clone)]
pub struct DescriptorSummary {
    pub resource_name: String,
    pub is_expansion: bool,
    pub requests: usize,
    pub errors: usize,
    pub pages_fetched: usize,
    pub records_fetched: usize,
    pub total_response_time_ms: u64,
    pub stop_reason: StopReason,
}

impl DescriptorSummary {
    fn new(request: &RequestDescriptor) -> Self {
        Self {
            resource_name: request.resource_name.clone(),
            is_expansion: request.is_expansion(),
            requests: 0,
            errors: 0,
            pages_fetched: 0,
            records_fetched: 0,
            total_response_time_ms: 0,
            stop_reason: StopReason::Completed,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.stop_reason == StopReason::ErrorBudgetExhausted
    }
}

/// Aggregate statistics of a run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub descriptors: Vec<DescriptorSummary>,
    /// Records nested in expansions across all resources
    pub expanded_records: u64,
}

impl RunSummary {
    pub fn total_requests(&self) -> usize {
        self.descriptors.iter().map(|d| d.requests).sum()
    }

    pub fn total_records(&self) -> usize {
        self.descriptors.iter().map(|d| d.records_fetched).sum()
    }

    pub fn average_response_time_ms(&self) -> f64 {
        let requests = self.total_requests();
        if requests == 0 {
            return 0.0;
        }
        let total: u64 = self.descriptors.iter().map(|d| d.total_response_time_ms).sum();
        total as f64 / requests as f64
    }

    pub fn failed_descriptors(&self) -> impl Iterator<Item = &DescriptorSummary> {
        self.descriptors.iter().filter(|d| d.is_failed())
    }

    pub fn has_failures(&self) -> bool {
        self.failed_descriptors().next().is_some()
    }
}

/// Result of [`Replicator::run`]
#[derive(Debug, Clone)]
pub struct ReplicationOutcome {
    pub summary: RunSummary,
    pub report: AvailabilityReport,
}

/// Sequential replication driver
pub struct Replicator {
    http: reqwest::Client,
    auth: Arc<AuthProvider>,
    config: ReplicationConfig,
    page_writer: Option<Box<dyn PageWriter>>,
    report_writer: Box<dyn ReportWriter>,
}

impl Replicator {
    /// Create a replicator writing its report (and pages, when `persist_pages`
    /// is set) to the configured output directory
    pub fn new(http: reqwest::Client, auth: Arc<AuthProvider>, config: ReplicationConfig) -> Self {
        let report_writer = Box::new(JsonReportWriter::new(config.output_dir.clone()));
        let page_writer = config.persist_pages.then(|| {
            Box::new(DirectoryPageWriter::new(config.output_dir.clone(), Utc::now()))
                as Box<dyn PageWriter>
        });
        Self {
            http,
            auth,
            config,
            page_writer,
            report_writer,
        }
    }

    /// Persist every page with `writer`
    pub fn with_page_writer(mut self, writer: impl PageWriter + 'static) -> Self {
        self.page_writer = Some(Box::new(writer));
        self
    }

    pub fn with_report_writer(mut self, writer: impl ReportWriter + 'static) -> Self {
        self.report_writer = Box::new(writer);
        self
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Replicate every descriptor in order, then consolidate and write the report.
    ///
    /// A descriptor that runs out of error budget is recorded as failed and the
    /// run moves on; auth failures and writer errors abort the run.
    pub async fn run(&self, requests: &[RequestDescriptor]) -> Result<ReplicationOutcome> {
        let started_at = Utc::now();
        let mut accumulator = AvailabilityAccumulator::new();
        let mut descriptors = Vec::with_capacity(requests.len());

        for (index, request) in requests.iter().enumerate() {
            if index > 0 {
                self.pause().await;
            }

            info!(
                "[{}] Replicating with {} strategy",
                request.resource_name, self.config.strategy
            );
            let mut scored = AvailabilityAccumulator::new();
            let summary = self.replicate(request, &mut scored).await?;
            accumulator.merge(scored);

            match summary.stop_reason {
                StopReason::ErrorBudgetExhausted => warn!(
                    "[{}] Stopped after {} failed requests, {} records fetched",
                    summary.resource_name, summary.errors, summary.records_fetched
                ),
                _ => info!(
                    "[{}] Done: {} records in {} pages",
                    summary.resource_name, summary.records_fetched, summary.pages_fetched
                ),
            }
            descriptors.push(summary);
        }

        let report = AvailabilityReport::new(consolidate(&accumulator), &self.config.report);
        self.report_writer.write_report(&report).await?;

        let expanded_records = accumulator
            .iter()
            .filter(|r| r.is_expansion)
            .map(|r| r.num_records_fetched)
            .sum();

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            descriptors,
            expanded_records,
        };

        info!(
            "Replication finished: {} requests, {:.2}ms average response time, {} records, {} expanded records",
            summary.total_requests(),
            summary.average_response_time_ms(),
            summary.total_records(),
            summary.expanded_records
        );

        Ok(ReplicationOutcome { summary, report })
    }

    async fn replicate(
        &self,
        request: &RequestDescriptor,
        accumulator: &mut AvailabilityAccumulator,
    ) -> Result<DescriptorSummary> {
        let mut iterator = ReplicationIterator::new(
            self.http.clone(),
            self.auth.clone(),
            request.clone(),
            self.config.iterator_options(),
        )?;

        let mut summary = DescriptorSummary::new(request);
        let mut page_index = 0;

        while let Some(page) = iterator.next_page().await? {
            summary.requests += 1;
            summary.total_response_time_ms += page.response_time_ms;
            summary.pages_fetched = page.pages_fetched;
            summary.records_fetched = page.total_records_fetched;

            if page.is_rate_limited() {
                summary.errors += 1;
                let wait = self.config.rate_limited_wait();
                warn!(
                    "[{}] Rate limited, waiting {} minutes before retrying",
                    request.resource_name, self.config.rate_limited_wait_time_minutes
                );
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
                continue;
            }

            match &page.error {
                Some(error) => {
                    summary.errors += 1;
                    warn!("[{}] {} ({})", request.resource_name, error, page.request_uri);
                }
                None if page.has_results => {
                    score_page(request, &page, accumulator, &self.config.scoring);

                    if let Some(writer) = &self.page_writer {
                        writer.write_page(request, page_index, &page).await?;
                    }
                    page_index += 1;
                }
                None => {}
            }

            if let Some(limit) = self.config.limit {
                if page.total_records_fetched >= limit {
                    info!(
                        "[{}] Record limit of {} reached",
                        request.resource_name, limit
                    );
                    summary.stop_reason = StopReason::LimitReached;
                    return Ok(summary);
                }
            }

            self.pause().await;
        }

        if iterator.state().num_errors > self.config.max_error_count {
            summary.stop_reason = StopReason::ErrorBudgetExhausted;
        }

        Ok(summary)
    }

    async fn pause(&self) {
        let delay = self.config.delay_between_requests();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Credentials;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::replication::PageResult;

    #[derive(Default, Clone)]
    struct MemoryReportWriter {
        reports: Arc<Mutex<Vec<AvailabilityReport>>>,
    }

    #[async_trait]
    impl ReportWriter for MemoryReportWriter {
        async fn write_report(&self, report: &AvailabilityReport) -> Result<()> {
            self.reports.lock().unwrap().push(report.clone());
            Ok(())
        }
    }

    #[derive(Default, Clone)]
    struct MemoryPageWriter {
        pages: Arc<Mutex<Vec<(String, usize)>>>,
    }

    #[async_trait]
    impl PageWriter for MemoryPageWriter {
        async fn write_page(
            &self,
            request: &RequestDescriptor,
            page_index: usize,
            _page: &PageResult,
        ) -> Result<()> {
            self.pages
                .lock()
                .unwrap()
                .push((request.resource_name.clone(), page_index));
            Ok(())
        }
    }

    async fn replicator(config: ReplicationConfig) -> (Replicator, MemoryReportWriter) {
        let auth = AuthProvider::new(reqwest::Client::new());
        auth.init(Credentials::bearer("token")).await.unwrap();
        let writer = MemoryReportWriter::default();
        let replicator = Replicator::new(reqwest::Client::new(), Arc::new(auth), config)
            .with_report_writer(writer.clone());
        (replicator, writer)
    }

    fn records(n: usize, offset: usize) -> Vec<Value> {
        (0..n)
            .map(|i| {
                json!({
                    "ListingKey": (offset + i).to_string(),
                    "ModificationTimestamp": "2023-01-01T00:00:00Z"
                })
            })
            .collect()
    }

    #[tokio::test]
    async fn test_limit_stops_descriptor_after_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Property"))
            .and(query_param("$skip", "0"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"value": records(10, 0)})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Property"))
            .and(query_param("$skip", "10"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"value": records(10, 10)})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Property"))
            .and(query_param("$skip", "20"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"value": records(10, 20)})),
            )
            .expect(0)
            .mount(&server)
            .await;

        let config = ReplicationConfig {
            page_size: Some(10),
            limit: Some(15),
            ..ReplicationConfig::unthrottled()
        };
        let (replicator, writer) = replicator(config).await;

        let outcome = replicator
            .run(&[RequestDescriptor::new(server.uri(), "Property")])
            .await
            .unwrap();

        let summary = &outcome.summary.descriptors[0];
        assert_eq!(summary.stop_reason, StopReason::LimitReached);
        assert_eq!(summary.records_fetched, 20);
        assert_eq!(outcome.report.report.resource("Property", false).unwrap().record_count, 20);
        assert_eq!(writer.reports.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_page_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("$skip", "0"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("$skip", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": records(3, 0)})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("$skip", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .mount(&server)
            .await;

        let (replicator, _) = replicator(ReplicationConfig::unthrottled()).await;
        let outcome = replicator
            .run(&[RequestDescriptor::new(server.uri(), "Property")])
            .await
            .unwrap();

        let summary = &outcome.summary.descriptors[0];
        assert_eq!(summary.requests, 3);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.records_fetched, 3);
        assert_eq!(summary.stop_reason, StopReason::Completed);
    }

    #[tokio::test]
    async fn test_failed_descriptor_does_not_stop_the_run() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Member"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Office"))
            .and(query_param("$skip", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": records(2, 0)})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Office"))
            .and(query_param("$skip", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .mount(&server)
            .await;

        let config = ReplicationConfig {
            max_error_count: 1,
            ..ReplicationConfig::unthrottled()
        };
        let (replicator, _) = replicator(config).await;
        let outcome = replicator
            .run(&[
                RequestDescriptor::new(server.uri(), "Member"),
                RequestDescriptor::new(server.uri(), "Office"),
            ])
            .await
            .unwrap();

        assert!(outcome.summary.descriptors[0].is_failed());
        assert_eq!(outcome.summary.descriptors[0].requests, 2);
        assert!(!outcome.summary.descriptors[1].is_failed());
        assert!(outcome.summary.has_failures());
        assert_eq!(outcome.summary.total_records(), 2);
        assert!(outcome.report.report.resource("Member", false).is_none());
    }

    #[tokio::test]
    async fn test_pages_are_persisted_with_zero_based_index() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("$skip", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": records(2, 0)})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("$skip", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": records(2, 2)})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("$skip", "4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .mount(&server)
            .await;

        let pages = MemoryPageWriter::default();
        let config = ReplicationConfig {
            page_size: Some(2),
            ..ReplicationConfig::unthrottled()
        };
        let (replicator, _) = replicator(config).await;
        let replicator = replicator.with_page_writer(pages.clone());

        let outcome = replicator
            .run(&[RequestDescriptor::new(server.uri(), "Property")])
            .await
            .unwrap();

        assert_eq!(
            *pages.pages.lock().unwrap(),
            vec![("Property".to_string(), 0), ("Property".to_string(), 1)]
        );
        assert_eq!(outcome.summary.total_requests(), 3);
    }

    #[tokio::test]
    async fn test_auth_failure_aborts_run() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .expect(0)
            .mount(&server)
            .await;

        let writer = MemoryReportWriter::default();
        let replicator = Replicator::new(
            reqwest::Client::new(),
            Arc::new(AuthProvider::new(reqwest::Client::new())),
            ReplicationConfig::unthrottled(),
        )
        .with_report_writer(writer.clone());

        let result = replicator
            .run(&[RequestDescriptor::new(server.uri(), "Property")])
            .await;

        assert!(result.unwrap_err().is_auth());
        assert!(writer.reports.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_descriptors_for_same_resource_are_merged() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("$filter", "City eq 'Austin'"))
            .and(query_param("$skip", "0"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"value": records(2, 0)})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("$filter", "City eq 'Dallas'"))
            .and(query_param("$skip", "0"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"value": records(3, 2)})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("$skip", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("$skip", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .mount(&server)
            .await;

        let (replicator, _) = replicator(ReplicationConfig::unthrottled()).await;
        let outcome = replicator
            .run(&[
                RequestDescriptor::new(server.uri(), "Property").filter("City eq 'Austin'"),
                RequestDescriptor::new(server.uri(), "Property").filter("City eq 'Dallas'"),
            ])
            .await
            .unwrap();

        let report = &outcome.report.report;
        assert_eq!(report.resources.len(), 1);
        let property = report.resource("Property", false).unwrap();
        assert_eq!(property.record_count, 5);
        assert_eq!(property.responses.as_ref().map(Vec::len), Some(2));

        let listing_key = report
            .fields
            .iter()
            .find(|f| f.field_name == "ListingKey")
            .unwrap();
        assert_eq!(listing_key.frequency, 5);
    }
}
