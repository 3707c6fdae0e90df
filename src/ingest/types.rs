// src/ingest/types.rs
use std::collections::BTreeMap;

use crate::item::{NormalizedItem, Source};

/// Filter/sort parameters for one adapter, supplied by listing configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageParams(BTreeMap<String, String>);

impl PageParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// One page of projected records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedPage {
    pub items: Vec<NormalizedItem>,
    /// Records the upstream returned, including ones skipped during projection.
    pub upstream_count: usize,
    /// Last page as reported by the upstream, when it says.
    pub last_page: Option<u32>,
}

impl FetchedPage {
    pub fn new(items: Vec<NormalizedItem>) -> Self {
        let upstream_count = items.len();
        Self {
            items,
            upstream_count,
            last_page: None,
        }
    }
}

/// Page-level failure. The coordinator counts the source as failed for the round.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{source_name} fetch failed: {message}")]
    Fetch {
        source_name: Source,
        message: String,
    },
    #[error("{source_name} response did not match the expected shape: {message}")]
    Parse {
        source_name: Source,
        message: String,
    },
}

impl UpstreamError {
    pub fn fetch(source: Source, err: impl std::fmt::Display) -> Self {
        UpstreamError::Fetch {
            source_name: source,
            message: err.to_string(),
        }
    }

    pub fn parse(source: Source, err: impl std::fmt::Display) -> Self {
        UpstreamError::Parse {
            source_name: source,
            message: err.to_string(),
        }
    }

    pub fn source_name(&self) -> Source {
        match self {
            UpstreamError::Fetch { source_name, .. } | UpstreamError::Parse { source_name, .. } => {
                *source_name
            }
        }
    }
}

/// Record-level projection failure; the record is skipped, the page survives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("unexpected record shape: {0}")]
    Shape(String),
    #[error("missing field `{0}`")]
    Missing(&'static str),
    #[error("field `{field}` does not match pattern: {value:?}")]
    Pattern { field: &'static str, value: String },
}

#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch_page(&self, page: u32, params: &PageParams)
        -> Result<FetchedPage, UpstreamError>;
    fn source(&self) -> Source;
    fn name(&self) -> &'static str;
}
