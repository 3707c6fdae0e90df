// src/ingest/proxy.rs
//! Client side of the scrape query proxy: it runs an xpath query against an
//! arbitrary HTML page and answers with the matched nodes as JSON.

use serde::Deserialize;

use crate::ingest::decode_body;
use crate::ingest::transport::Transport;
use crate::ingest::types::UpstreamError;
use crate::item::Source;

pub const DEFAULT_SCRAPE_PROXY: &str = "https://query.yahooapis.com/v1/public/yql";

/// Either a single node or a list of them; the proxy collapses one-element lists.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(v) => v,
            OneOrMany::One(t) => vec![t],
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProxyResponse {
    query: ProxyQuery,
}

#[derive(Debug, Deserialize)]
struct ProxyQuery {
    results: Option<ProxyResults>,
}

#[derive(Debug, Deserialize)]
struct ProxyResults {
    li: Option<OneOrMany<serde_json::Value>>,
}

pub struct ScrapeProxy {
    endpoint: String,
    transport: Transport,
}

impl ScrapeProxy {
    pub fn new(endpoint: &str, transport: Transport) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            transport,
        }
    }

    pub fn query_for(page_url: &str, xpath: &str) -> String {
        format!(r#"SELECT * FROM html WHERE url="{page_url}" and xpath="{xpath}""#)
    }

    /// Run the query and return the matched `li` nodes (empty when nothing matched).
    pub async fn select_list_items(
        &self,
        source: Source,
        page: u32,
        page_url: &str,
        xpath: &str,
    ) -> Result<Vec<serde_json::Value>, UpstreamError> {
        let query = vec![
            ("q".to_string(), Self::query_for(page_url, xpath)),
            ("format".to_string(), "json".to_string()),
        ];
        let body = self
            .transport
            .get(source, page, &self.endpoint, &query)
            .await?;
        parse_list_items(source, &body)
    }
}

pub(crate) fn parse_list_items(
    source: Source,
    body: &str,
) -> Result<Vec<serde_json::Value>, UpstreamError> {
    let resp: ProxyResponse = decode_body(source, body)?;
    Ok(resp
        .query
        .results
        .and_then(|r| r.li)
        .map(OneOrMany::into_vec)
        .unwrap_or_default())
}
