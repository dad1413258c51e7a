//! Output sinks for replicated pages and the final report

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};

use super::page::PageResult;
use super::request::RequestDescriptor;
use crate::availability::{AvailabilityReport, REPORT_FILE_NAME};
use crate::error::Result;

/// Persists successful pages as they are replicated
#[async_trait]
pub trait PageWriter: Send + Sync {
    /// `page_index` is zero-based per descriptor
    async fn write_page(
        &self,
        request: &RequestDescriptor,
        page_index: usize,
        page: &PageResult,
    ) -> Result<()>;
}

/// Receives the finished availability report
#[async_trait]
pub trait ReportWriter: Send + Sync {
    async fn write_report(&self, report: &AvailabilityReport) -> Result<()>;
}

/// Writes each page to `<output_dir>/<resource>/<run timestamp>/page-<n>.json`
#[derive(Debug, Clone)]
pub struct DirectoryPageWriter {
    output_dir: PathBuf,
    run_timestamp: String,
}

impl DirectoryPageWriter {
    pub fn new(output_dir: impl Into<PathBuf>, started_at: DateTime<Utc>) -> Self {
        Self {
            output_dir: output_dir.into(),
            run_timestamp: started_at.format("%Y%m%dT%H%M%S%3fZ").to_string(),
        }
    }

    /// Directory holding the pages of one resource for this run
    pub fn resource_dir(&self, request: &RequestDescriptor) -> PathBuf {
        self.output_dir
            .join(&request.resource_name)
            .join(&self.run_timestamp)
    }

    pub fn page_path(&self, request: &RequestDescriptor, page_index: usize) -> PathBuf {
        self.resource_dir(request)
            .join(format!("page-{}.json", page_index))
    }
}

#[async_trait]
impl PageWriter for DirectoryPageWriter {
    async fn write_page(
        &self,
        request: &RequestDescriptor,
        page_index: usize,
        page: &PageResult,
    ) -> Result<()> {
        let path = self.page_path(request, page_index);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec(&page.response)?;
        tokio::fs::write(&path, body).await?;

        debug!("[{}] Wrote page {} to {}", request.resource_name, page_index, path.display());
        Ok(())
    }
}

/// Writes the report as pretty JSON to `<output_dir>/data-availability-report.json`
#[derive(Debug, Clone)]
pub struct JsonReportWriter {
    output_dir: PathBuf,
}

impl JsonReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join(REPORT_FILE_NAME)
    }
}

#[async_trait]
impl ReportWriter for JsonReportWriter {
    async fn write_report(&self, report: &AvailabilityReport) -> Result<()> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let path = self.report_path();
        let body = serde_json::to_string_pretty(report)?;
        tokio::fs::write(&path, body).await?;

        info!("Data availability report written to {}", path.display());
        Ok(())
    }
}
