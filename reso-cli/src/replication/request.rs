//! Request descriptors for replication
//!
//! A descriptor identifies one top-level resource (or one expansion) to
//! replicate. Building the list of descriptors from server metadata happens
//! outside this crate; the CLI builds simple ones from its arguments.

use serde::{Deserialize, Serialize};

/// One resource (or expansion) to replicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDescriptor {
    /// Service root, e.g. `https://api.example.com/odata`
    pub base_uri: String,
    /// Resource name, e.g. `Property`
    pub resource_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_resource_name: Option<String>,
    /// Navigation properties to `$expand`, e.g. `Media`
    #[serde(default)]
    pub expansions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orderby: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<u32>,
    /// Page size requested through `Prefer: odata.maxpagesize`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_page_size: Option<u32>,
}

impl RequestDescriptor {
    pub fn new(base_uri: impl Into<String>, resource_name: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into(),
            resource_name: resource_name.into(),
            parent_resource_name: None,
            expansions: Vec::new(),
            filter: None,
            orderby: None,
            top: None,
            max_page_size: None,
        }
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_resource_name = Some(parent.into());
        self
    }

    pub fn expand(mut self, expansions: &[&str]) -> Self {
        self.expansions = expansions.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn orderby(mut self, orderby: impl Into<String>) -> Self {
        self.orderby = Some(orderby.into());
        self
    }

    pub fn top(mut self, top: u32) -> Self {
        self.top = Some(top);
        self
    }

    pub fn max_page_size(mut self, size: u32) -> Self {
        self.max_page_size = Some(size);
        self
    }

    /// Whether this descriptor replicates an expansion of another resource
    pub fn is_expansion(&self) -> bool {
        self.parent_resource_name.is_some()
    }

    /// Build the first-page request URI
    pub fn request_uri(&self) -> String {
        let mut uri = format!(
            "{}/{}",
            self.base_uri.trim_end_matches('/'),
            self.resource_name
        );

        let mut params = Vec::new();
        if let Some(filter) = &self.filter {
            params.push(format!("$filter={}", urlencoding::encode(filter)));
        }
        if let Some(orderby) = &self.orderby {
            params.push(format!("$orderby={}", urlencoding::encode(orderby)));
        }
        if let Some(top) = self.top {
            params.push(format!("$top={}", top));
        }
        if !self.expansions.is_empty() {
            params.push(format!(
                "$expand={}",
                urlencoding::encode(&self.expansions.join(","))
            ));
        }

        if !params.is_empty() {
            uri.push('?');
            uri.push_str(&params.join("&"));
        }
        uri
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_request_uri() {
        let request = RequestDescriptor::new("https://api.example.com/odata/", "Property");
        assert_eq!(request.request_uri(), "https://api.example.com/odata/Property");
        assert!(!request.is_expansion());
    }

    #[test]
    fn test_request_uri_with_options() {
        let request = RequestDescriptor::new("https://api.example.com/odata", "Property")
            .filter("StandardStatus eq 'Active'")
            .orderby("ModificationTimestamp desc")
            .top(50)
            .expand(&["Media"]);

        assert_eq!(
            request.request_uri(),
            "https://api.example.com/odata/Property?$filter=StandardStatus%20eq%20%27Active%27\
             &$orderby=ModificationTimestamp%20desc&$top=50&$expand=Media"
        );
    }

    #[test]
    fn test_expansion_descriptor() {
        let request = RequestDescriptor::new("https://api.example.com", "Media").parent("Property");
        assert!(request.is_expansion());
        assert_eq!(request.parent_resource_name.as_deref(), Some("Property"));
    }
}
