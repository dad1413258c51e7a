//! Pagination strategies and next-request resolution

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::page::IterationState;
use crate::error::{ReplicationError, Result};

/// `$top` used by TopAndSkip when neither the caller nor the URI sets one
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// How successive pages are requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicationStrategy {
    TopAndSkip,
    NextLink,
    /// Recognized, never implemented
    TimestampAsc,
    /// Recognized, never implemented
    TimestampDesc,
}

impl ReplicationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TopAndSkip => "TopAndSkip",
            Self::NextLink => "NextLink",
            Self::TimestampAsc => "TimestampAsc",
            Self::TimestampDesc => "TimestampDesc",
        }
    }

    /// Fail unless requests can actually be resolved with this strategy
    pub fn ensure_supported(&self) -> Result<()> {
        match self {
            Self::TopAndSkip | Self::NextLink => Ok(()),
            Self::TimestampAsc | Self::TimestampDesc => {
                Err(ReplicationError::UnsupportedStrategy(self.as_str().to_string()))
            }
        }
    }
}

impl fmt::Display for ReplicationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplicationStrategy {
    type Err = ReplicationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "TopAndSkip" => Ok(Self::TopAndSkip),
            "NextLink" => Ok(Self::NextLink),
            "TimestampAsc" => Ok(Self::TimestampAsc),
            "TimestampDesc" => Ok(Self::TimestampDesc),
            other => Err(ReplicationError::UnsupportedStrategy(other.to_string())),
        }
    }
}

/// Resolve the URI of the next request for `strategy`.
///
/// `page_size` is the caller's `$top` for TopAndSkip; when `None`, an existing
/// `$top` in the request URI is kept, falling back to [`DEFAULT_PAGE_SIZE`].
pub fn build_request_uri(
    state: &IterationState,
    strategy: ReplicationStrategy,
    page_size: Option<u32>,
) -> Result<String> {
    match strategy {
        ReplicationStrategy::TopAndSkip => Ok(build_top_and_skip_uri(
            &state.request_uri,
            page_size,
            state.total_records_fetched,
        )),
        ReplicationStrategy::NextLink => Ok(state
            .next_link
            .clone()
            .unwrap_or_else(|| state.request_uri.clone())),
        ReplicationStrategy::TimestampAsc | ReplicationStrategy::TimestampDesc => {
            Err(ReplicationError::UnsupportedStrategy(strategy.as_str().to_string()))
        }
    }
}

fn build_top_and_skip_uri(request_uri: &str, page_size: Option<u32>, skip: usize) -> String {
    let (base, query) = match request_uri.split_once('?') {
        Some((base, query)) => (base, query),
        None => (request_uri, ""),
    };

    let mut existing_top = None;
    let mut params: Vec<&str> = Vec::new();

    // Raw pairs are kept as-is so encoded $filter expressions survive untouched
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        match decode_key(key).as_str() {
            "$skip" => {}
            "$top" => existing_top = Some(value),
            _ => params.push(pair),
        }
    }

    let top = match page_size {
        Some(size) => size.to_string(),
        None => existing_top
            .map(|v| v.to_string())
            .unwrap_or_else(|| DEFAULT_PAGE_SIZE.to_string()),
    };

    let top_param = format!("$top={}", top);
    let skip_param = format!("$skip={}", skip);

    let mut query = params.join("&");
    for param in [top_param, skip_param] {
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&param);
    }

    format!("{}?{}", base, query)
}

fn decode_key(key: &str) -> String {
    urlencoding::decode(key)
        .map(|k| k.into_owned())
        .unwrap_or_else(|_| key.to_string())
}
