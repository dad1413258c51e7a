//! Availability scorer
//!
//! Folds replicated records into an [`AvailabilityAccumulator`]: field
//! frequencies, date ranges, postal codes, lookup value counts and, for
//! declared expansions, the same statistics for the nested records.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::models::{AvailabilityAccumulator, ResourceAvailability, ResponseInfo};
use crate::replication::{PageResult, RequestDescriptor};

/// Settings that decide what the scorer tracks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Field whose values define the date range of a resource
    pub date_field: String,
    pub postal_code_field: String,
    /// Enumeration fields whose individual values are counted
    pub lookup_fields: BTreeSet<String>,
    /// Expansion field name -> resource name its records are reported under
    pub expansion_targets: BTreeMap<String, String>,
    pub max_expansion_depth: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            date_field: "ModificationTimestamp".to_string(),
            postal_code_field: "PostalCode".to_string(),
            lookup_fields: BTreeSet::new(),
            expansion_targets: BTreeMap::from([("Media".to_string(), "Media".to_string())]),
            max_expansion_depth: 3,
        }
    }
}

impl ScoringConfig {
    /// Resource name used for records nested under `field`
    pub fn expansion_target<'a>(&'a self, field: &'a str) -> &'a str {
        self.expansion_targets
            .get(field)
            .map(String::as_str)
            .unwrap_or(field)
    }
}

/// Where a batch of records sits in the expansion tree
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext<'a> {
    pub resource_name: &'a str,
    pub parent_resource_name: Option<&'a str>,
    pub is_expansion: bool,
    /// Field names that hold expanded records
    pub expansions: &'a [String],
    pub depth: usize,
}

impl<'a> ScoringContext<'a> {
    /// Context for the top-level records of a request
    pub fn for_request(request: &'a RequestDescriptor) -> Self {
        Self {
            resource_name: &request.resource_name,
            parent_resource_name: request.parent_resource_name.as_deref(),
            is_expansion: request.is_expansion(),
            expansions: &request.expansions,
            depth: 0,
        }
    }

    fn expansion<'b>(&self, resource_name: &'b str) -> ScoringContext<'b>
    where
        'a: 'b,
    {
        ScoringContext {
            resource_name,
            parent_resource_name: Some(self.resource_name),
            is_expansion: true,
            expansions: self.expansions,
            depth: self.depth + 1,
        }
    }
}

/// Score the records of one successful page
pub fn score_page(
    request: &RequestDescriptor,
    page: &PageResult,
    accumulator: &mut AvailabilityAccumulator,
    config: &ScoringConfig,
) {
    let response = ResponseInfo {
        request_uri: Some(page.request_uri.clone()),
        response_time_ms: Some(page.response_time_ms),
        response_bytes: page.response_bytes,
    };
    score_payload(
        ScoringContext::for_request(request),
        page.records(),
        response,
        accumulator,
        config,
    );
}

/// Score `records` into the entry selected by `context`.
///
/// Values of unexpected JSON types are skipped rather than rejected; scoring
/// a record never fails.
pub fn score_payload(
    context: ScoringContext<'_>,
    records: &[Value],
    response: ResponseInfo,
    accumulator: &mut AvailabilityAccumulator,
    config: &ScoringConfig,
) {
    // Expanded records are scored after the parent batch so only one entry is borrowed at a time
    let mut nested: Vec<(String, Vec<Value>)> = Vec::new();

    {
        let entry = accumulator.entry(
            context.resource_name,
            context.parent_resource_name,
            context.is_expansion,
            &config.date_field,
        );

        if context.is_expansion {
            entry.responses.push(ResponseInfo {
                request_uri: None,
                response_time_ms: None,
                response_bytes: response.response_bytes,
            });
        } else {
            entry.responses.push(response);
        }
        entry.num_records_fetched += records.len() as u64;

        for record in records {
            let Some(fields) = record.as_object() else {
                continue;
            };

            for (field, value) in fields {
                if is_annotation(field) {
                    continue;
                }

                if is_populated(value) {
                    entry.count_field(field);
                    if config.lookup_fields.contains(field) {
                        record_lookup_values(entry, field, value);
                    }
                }

                if field == &config.date_field {
                    if let Some(date) = parse_date(value) {
                        entry.observe_date(date);
                    }
                }

                if field == &config.postal_code_field {
                    record_postal_code(entry, value);
                }

                if context.expansions.iter().any(|e| e == field) {
                    let expanded = coerce_to_records(value);
                    if !expanded.is_empty() {
                        nested.push((field.clone(), expanded));
                    }
                }
            }
        }
    }

    if nested.is_empty() {
        return;
    }

    if context.depth >= config.max_expansion_depth {
        debug!(
            "[{}] Expansion depth {} reached, not scoring nested records",
            context.resource_name, context.depth
        );
        return;
    }

    for (field, records) in nested {
        let target = config.expansion_target(&field);
        let response_bytes = serde_json::to_vec(&records).map(|b| b.len()).unwrap_or(0);
        let response = ResponseInfo {
            request_uri: None,
            response_time_ms: None,
            response_bytes,
        };
        score_payload(
            context.expansion(target),
            &records,
            response,
            accumulator,
            config,
        );
    }
}

fn is_annotation(field: &str) -> bool {
    field.contains('@')
}

/// Explicit nulls and empty strings, arrays or objects do not count as available
fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?;
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}

fn record_postal_code(entry: &mut ResourceAvailability, value: &Value) {
    let code = match value {
        Value::String(s) if !s.trim().is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return,
    };
    entry.postal_codes.insert(code);
}

fn record_lookup_values(entry: &mut ResourceAvailability, field: &str, value: &Value) {
    let values: Vec<&str> = match value {
        Value::String(s) => s.split(',').map(str::trim).collect(),
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => return,
    };

    let availability = entry.field_availability.entry(field.to_string()).or_default();
    for value in values.into_iter().filter(|v| !v.is_empty()) {
        *availability
            .lookup_values
            .entry(value.to_string())
            .or_default() += 1;
    }
}

fn coerce_to_records(value: &Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}
