//! Replication iterator
//!
//! Pulls one resource page by page. Each call to
//! [`ReplicationIterator::next_page`] issues at most one request and returns
//! the outcome as a [`PageResult`]; transport and HTTP failures are returned
//! as error pages until the error budget runs out.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::Stream;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

use super::page::{IterationState, PageError, PageResult};
use super::request::RequestDescriptor;
use super::strategy::{DEFAULT_PAGE_SIZE, ReplicationStrategy, build_request_uri};
use crate::api::AuthProvider;
use crate::error::{ReplicationError, Result};

/// Default number of consecutive failures tolerated before giving up
pub const DEFAULT_MAX_ERROR_COUNT: usize = 3;

/// Per-iterator settings
#[derive(Debug, Clone)]
pub struct IteratorOptions {
    pub strategy: ReplicationStrategy,
    /// `$top` for TopAndSkip
    pub page_size: Option<u32>,
    /// `Prefer: odata.maxpagesize` for NextLink; falls back to the descriptor, then `page_size`
    pub max_page_size: Option<u32>,
    pub max_error_count: usize,
}

impl Default for IteratorOptions {
    fn default() -> Self {
        Self {
            strategy: ReplicationStrategy::TopAndSkip,
            page_size: None,
            max_page_size: None,
            max_error_count: DEFAULT_MAX_ERROR_COUNT,
        }
    }
}

impl IteratorOptions {
    pub fn new(strategy: ReplicationStrategy) -> Self {
        Self {
            strategy,
            ..Default::default()
        }
    }
}

/// Lifecycle of an iterator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorStatus {
    Idle,
    Fetching,
    Yielded,
    Done,
    Failed,
}

/// Sequential page producer for one [`RequestDescriptor`]
pub struct ReplicationIterator {
    http: reqwest::Client,
    auth: Arc<AuthProvider>,
    request: RequestDescriptor,
    options: IteratorOptions,
    state: IterationState,
    headers: HeaderMap,
    status: IteratorStatus,
}

impl ReplicationIterator {
    /// Create an iterator. Fails immediately for unsupported strategies.
    pub fn new(
        http: reqwest::Client,
        auth: Arc<AuthProvider>,
        request: RequestDescriptor,
        options: IteratorOptions,
    ) -> Result<Self> {
        options.strategy.ensure_supported()?;

        let state = IterationState::new(request.request_uri());
        Ok(Self {
            http,
            auth,
            request,
            options,
            state,
            headers: HeaderMap::new(),
            status: IteratorStatus::Idle,
        })
    }

    pub fn request(&self) -> &RequestDescriptor {
        &self.request
    }

    pub fn state(&self) -> &IterationState {
        &self.state
    }

    pub fn status(&self) -> IteratorStatus {
        self.status
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, IteratorStatus::Done | IteratorStatus::Failed)
    }

    /// Fetch the next page, or `Ok(None)` once the iterator is finished.
    ///
    /// Returns `Err` only for fatal conditions (auth failure); the iterator
    /// then stays in [`IteratorStatus::Failed`].
    pub async fn next_page(&mut self) -> Result<Option<PageResult>> {
        match self.status {
            IteratorStatus::Done | IteratorStatus::Failed => return Ok(None),
            IteratorStatus::Idle => {
                if let Err(e) = self.prepare_headers().await {
                    self.status = IteratorStatus::Failed;
                    return Err(e);
                }
            }
            IteratorStatus::Fetching | IteratorStatus::Yielded => {}
        }

        if self.should_stop() {
            self.status = IteratorStatus::Done;
            return Ok(None);
        }

        let request_uri =
            build_request_uri(&self.state, self.options.strategy, self.options.page_size)?;

        if self.state.last_request_uri.as_deref() == Some(request_uri.as_str()) {
            debug!(
                "[{}] Next request repeats {}, stopping",
                self.request.resource_name, request_uri
            );
            self.status = IteratorStatus::Done;
            return Ok(None);
        }

        self.status = IteratorStatus::Fetching;
        let page = self.fetch(request_uri).await;
        self.status = IteratorStatus::Yielded;

        Ok(Some(page))
    }

    /// Consume the iterator as a stream of pages
    pub fn into_stream(self) -> impl Stream<Item = Result<PageResult>> {
        futures::stream::try_unfold(self, |mut iterator| async move {
            Ok(iterator.next_page().await?.map(|page| (page, iterator)))
        })
    }

    async fn prepare_headers(&mut self) -> Result<()> {
        let mut headers = self.auth.auth_headers().await?;

        if self.options.strategy == ReplicationStrategy::NextLink {
            let max_page_size = self
                .options
                .max_page_size
                .or(self.request.max_page_size)
                .or(self.options.page_size)
                .unwrap_or(DEFAULT_PAGE_SIZE);
            let value = HeaderValue::from_str(&format!("odata.maxpagesize={}", max_page_size))
                .map_err(|e| ReplicationError::InvalidUri {
                    uri: self.state.request_uri.clone(),
                    message: e.to_string(),
                })?;
            headers.insert("Prefer", value);
        }

        self.headers = headers;
        Ok(())
    }

    fn should_stop(&self) -> bool {
        if self.state.page_size == Some(0) {
            return true;
        }

        if self.state.num_errors > self.options.max_error_count {
            warn!(
                "[{}] Giving up after {} consecutive errors",
                self.request.resource_name, self.state.num_errors
            );
            return true;
        }

        // A successful NextLink page without a continuation link is the last one
        self.options.strategy == ReplicationStrategy::NextLink
            && self.state.pages_fetched > 0
            && self.state.next_link.is_none()
    }

    async fn fetch(&mut self, request_uri: String) -> PageResult {
        debug!("[{}] GET {}", self.request.resource_name, request_uri);

        let start_time = Utc::now();
        let timer = Instant::now();

        let outcome = match self
            .http
            .get(&request_uri)
            .headers(self.headers.clone())
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    match response.bytes().await {
                        Ok(body) => match serde_json::from_slice::<Value>(&body) {
                            Ok(json) => Ok((json, body.len())),
                            Err(e) => {
                                Err(PageError::general(format!("Invalid JSON response: {}", e)))
                            }
                        },
                        Err(e) => Err(PageError::general(e.to_string())),
                    }
                } else {
                    Err(PageError::http(
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("Unknown Status"),
                    ))
                }
            }
            Err(e) => Err(PageError::general(e.to_string())),
        };

        let response_time_ms = timer.elapsed().as_millis() as u64;
        let stop_time = Utc::now();

        match outcome {
            Ok((response, response_bytes)) => {
                let page_size = response
                    .get("value")
                    .and_then(Value::as_array)
                    .map(Vec::len)
                    .unwrap_or(0);

                self.state.next_link = response
                    .get("@odata.nextLink")
                    .and_then(Value::as_str)
                    .map(|s| s.to_string());
                self.state.page_size = Some(page_size);
                self.state.total_records_fetched += page_size;
                self.state.pages_fetched += 1;
                self.state.num_errors = 0;
                self.state.last_request_uri = Some(request_uri.clone());

                debug!(
                    "[{}] {} records in {}ms ({} total)",
                    self.request.resource_name,
                    page_size,
                    response_time_ms,
                    self.state.total_records_fetched
                );

                PageResult {
                    request_uri,
                    has_results: page_size > 0,
                    has_error: false,
                    response_time_ms,
                    response,
                    error: None,
                    start_time,
                    stop_time,
                    total_records_fetched: self.state.total_records_fetched,
                    pages_fetched: self.state.pages_fetched,
                    response_bytes,
                }
            }
            Err(error) => {
                self.state.num_errors += 1;
                warn!(
                    "[{}] Request failed ({} of {} allowed): {}",
                    self.request.resource_name,
                    self.state.num_errors,
                    self.options.max_error_count,
                    error
                );

                PageResult {
                    request_uri,
                    has_results: false,
                    has_error: true,
                    response_time_ms,
                    response: Value::Null,
                    error: Some(error),
                    start_time,
                    stop_time,
                    total_records_fetched: self.state.total_records_fetched,
                    pages_fetched: self.state.pages_fetched,
                    response_bytes: 0,
                }
            }
        }
    }
}
