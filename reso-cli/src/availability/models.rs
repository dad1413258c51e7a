//! Data availability accumulator
//!
//! One [`ResourceAvailability`] per resource name and expansion flag, mutated
//! by the scorer for the whole run and consumed by the consolidator.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Frequency of one field across all scored records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldAvailability {
    pub frequency: u64,
    /// Value counts for lookup (enumeration) fields
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub lookup_values: BTreeMap<String, u64>,
}

/// One scored response. Expansions carry only the byte size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    pub response_bytes: usize,
}

/// Running availability statistics for one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAvailability {
    pub resource_name: String,
    pub parent_resource_name: Option<String>,
    pub is_expansion: bool,
    pub date_field: String,
    pub date_low: Option<DateTime<Utc>>,
    pub date_high: Option<DateTime<Utc>>,
    pub num_records_fetched: u64,
    pub field_availability: BTreeMap<String, FieldAvailability>,
    pub responses: Vec<ResponseInfo>,
    pub postal_codes: BTreeSet<String>,
}

impl ResourceAvailability {
    pub fn new(
        resource_name: impl Into<String>,
        parent_resource_name: Option<String>,
        is_expansion: bool,
        date_field: impl Into<String>,
    ) -> Self {
        Self {
            resource_name: resource_name.into(),
            parent_resource_name,
            is_expansion,
            date_field: date_field.into(),
            date_low: None,
            date_high: None,
            num_records_fetched: 0,
            field_availability: BTreeMap::new(),
            responses: Vec::new(),
            postal_codes: BTreeSet::new(),
        }
    }

    /// Widen the observed date range to include `date`
    pub fn observe_date(&mut self, date: DateTime<Utc>) {
        self.date_low = Some(self.date_low.map_or(date, |low| low.min(date)));
        self.date_high = Some(self.date_high.map_or(date, |high| high.max(date)));
    }

    /// Count one populated occurrence of `field`
    pub fn count_field(&mut self, field: &str) -> &mut FieldAvailability {
        let entry = self.field_availability.entry(field.to_string()).or_default();
        entry.frequency += 1;
        entry
    }

    pub fn frequency(&self, field: &str) -> u64 {
        self.field_availability
            .get(field)
            .map(|f| f.frequency)
            .unwrap_or(0)
    }
}

/// Key of an accumulator entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub resource_name: String,
    pub is_expansion: bool,
}

impl ResourceKey {
    pub fn new(resource_name: impl Into<String>, is_expansion: bool) -> Self {
        Self {
            resource_name: resource_name.into(),
            is_expansion,
        }
    }
}

/// Availability of every resource seen during a run.
///
/// Entries keep their insertion order so reports list resources in the order
/// they were replicated.
#[derive(Debug, Clone, Default)]
pub struct AvailabilityAccumulator {
    index: HashMap<ResourceKey, usize>,
    entries: Vec<ResourceAvailability>,
}

impl AvailabilityAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or create the entry for a resource
    pub fn entry(
        &mut self,
        resource_name: &str,
        parent_resource_name: Option<&str>,
        is_expansion: bool,
        date_field: &str,
    ) -> &mut ResourceAvailability {
        let key = ResourceKey::new(resource_name, is_expansion);
        let position = match self.index.get(&key) {
            Some(position) => *position,
            None => {
                self.entries.push(ResourceAvailability::new(
                    resource_name,
                    parent_resource_name.map(|p| p.to_string()),
                    is_expansion,
                    date_field,
                ));
                let position = self.entries.len() - 1;
                self.index.insert(key, position);
                position
            }
        };
        &mut self.entries[position]
    }

    pub fn get(&self, resource_name: &str, is_expansion: bool) -> Option<&ResourceAvailability> {
        self.index
            .get(&ResourceKey::new(resource_name, is_expansion))
            .map(|position| &self.entries[*position])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceAvailability> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold another accumulator into this one (one accumulator per descriptor, merged at the end)
    pub fn merge(&mut self, other: AvailabilityAccumulator) {
        for theirs in other.entries {
            let ours = self.entry(
                &theirs.resource_name,
                theirs.parent_resource_name.as_deref(),
                theirs.is_expansion,
                &theirs.date_field,
            );

            if let Some(low) = theirs.date_low {
                ours.observe_date(low);
            }
            if let Some(high) = theirs.date_high {
                ours.observe_date(high);
            }
            ours.num_records_fetched += theirs.num_records_fetched;
            for (field, availability) in theirs.field_availability {
                let target = ours.field_availability.entry(field).or_default();
                target.frequency += availability.frequency;
                for (value, count) in availability.lookup_values {
                    *target.lookup_values.entry(value).or_default() += count;
                }
            }
            ours.responses.extend(theirs.responses);
            ours.postal_codes.extend(theirs.postal_codes);
        }
    }
}
