//! Report consolidation
//!
//! Turns the raw accumulator into the data availability report: per-resource
//! size/time statistics plus a flat list of field frequencies.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::models::{AvailabilityAccumulator, ResourceAvailability, ResponseInfo};
use super::stats::Summary;

/// File name of the written report
pub const REPORT_FILE_NAME: &str = "data-availability-report.json";

/// Statistics for one resource or expansion
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReport {
    pub resource_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_resource_name: Option<String>,
    pub is_expansion: bool,
    pub record_count: u64,
    pub date_field: String,
    pub date_low: Option<DateTime<Utc>>,
    pub date_high: Option<DateTime<Utc>>,
    pub average_response_bytes: f64,
    pub median_response_bytes: f64,
    pub std_dev_response_bytes: f64,
    /// Timing statistics are absent for expansions, which ride on the parent request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_response_time_millis: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median_response_time_millis: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_dev_response_time_millis: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responses: Option<Vec<ResponseInfo>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub postal_codes: Vec<String>,
}

/// Frequency of one field of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldReport {
    pub resource_name: String,
    pub field_name: String,
    pub frequency: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_resource_name: Option<String>,
    pub is_expansion: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub lookup_values: BTreeMap<String, u64>,
}

/// Consolidated statistics for a whole run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsolidatedReport {
    pub resources: Vec<ResourceReport>,
    pub fields: Vec<FieldReport>,
    pub lookups: Vec<Value>,
}

impl ConsolidatedReport {
    pub fn resource(&self, resource_name: &str, is_expansion: bool) -> Option<&ResourceReport> {
        self.resources
            .iter()
            .find(|r| r.resource_name == resource_name && r.is_expansion == is_expansion)
    }
}

/// Descriptive header fields of the report file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub description: String,
    pub version: String,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            description: "RESO Data Availability Report".to_string(),
            version: "1.7".to_string(),
        }
    }
}

/// The report file: header fields plus the consolidated statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityReport {
    pub description: String,
    pub version: String,
    pub generated_on: DateTime<Utc>,
    #[serde(flatten)]
    pub report: ConsolidatedReport,
}

impl AvailabilityReport {
    pub fn new(report: ConsolidatedReport, settings: &ReportSettings) -> Self {
        Self {
            description: settings.description.clone(),
            version: settings.version.clone(),
            generated_on: Utc::now(),
            report,
        }
    }
}

/// Consolidate every accumulated resource into a report
pub fn consolidate(accumulator: &AvailabilityAccumulator) -> ConsolidatedReport {
    let mut resources = Vec::with_capacity(accumulator.len());
    let mut fields = Vec::new();

    for resource in accumulator.iter() {
        resources.push(resource_report(resource));

        fields.extend(
            resource
                .field_availability
                .iter()
                .map(|(field_name, availability)| FieldReport {
                    resource_name: resource.resource_name.clone(),
                    field_name: field_name.clone(),
                    frequency: availability.frequency,
                    parent_resource_name: resource.parent_resource_name.clone(),
                    is_expansion: resource.is_expansion,
                    lookup_values: availability.lookup_values.clone(),
                }),
        );
    }

    ConsolidatedReport {
        resources,
        fields,
        lookups: Vec::new(),
    }
}

fn resource_report(resource: &ResourceAvailability) -> ResourceReport {
    let bytes: Vec<f64> = resource
        .responses
        .iter()
        .map(|r| r.response_bytes as f64)
        .collect();
    let byte_stats = Summary::of(&bytes);

    let time_stats = if resource.is_expansion {
        None
    } else {
        let times: Vec<f64> = resource
            .responses
            .iter()
            .filter_map(|r| r.response_time_ms)
            .map(|t| t as f64)
            .collect();
        Some(Summary::of(&times))
    };

    ResourceReport {
        resource_name: resource.resource_name.clone(),
        parent_resource_name: resource.parent_resource_name.clone(),
        is_expansion: resource.is_expansion,
        record_count: resource.num_records_fetched,
        date_field: resource.date_field.clone(),
        date_low: resource.date_low,
        date_high: resource.date_high,
        average_response_bytes: byte_stats.mean,
        median_response_bytes: byte_stats.median,
        std_dev_response_bytes: byte_stats.std_dev,
        average_response_time_millis: time_stats.map(|s| s.mean),
        median_response_time_millis: time_stats.map(|s| s.median),
        std_dev_response_time_millis: time_stats.map(|s| s.std_dev),
        responses: (!resource.is_expansion).then(|| resource.responses.clone()),
        postal_codes: resource.postal_codes.iter().cloned().collect(),
    }
}
