// src/ingest/transport.rs
//! How adapters reach their upstream: live HTTP, or canned page bodies for tests and demos.

use std::collections::BTreeMap;
use std::time::Duration;

use metrics::histogram;

use crate::ingest::types::UpstreamError;
use crate::item::Source;

#[derive(Clone)]
pub enum Transport {
    /// Canned bodies keyed by page number.
    Fixture(BTreeMap<u32, String>),
    Http { client: reqwest::Client },
}

impl Transport {
    pub fn http(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("designerboard/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Transport::Http { client })
    }

    /// Fixture transport serving the same body for page 1 only.
    pub fn fixture(body: &str) -> Self {
        Transport::fixture_pages([(1, body)])
    }

    pub fn fixture_pages<'a>(pages: impl IntoIterator<Item = (u32, &'a str)>) -> Self {
        Transport::Fixture(
            pages
                .into_iter()
                .map(|(page, body)| (page, body.to_string()))
                .collect(),
        )
    }

    /// GET `url` with `query`, returning the body text.
    pub async fn get(
        &self,
        source: Source,
        page: u32,
        url: &str,
        query: &[(String, String)],
    ) -> Result<String, UpstreamError> {
        match self {
            Transport::Fixture(pages) => pages
                .get(&page)
                .cloned()
                .ok_or_else(|| UpstreamError::fetch(source, format!("no fixture for page {page}"))),

            Transport::Http { client } => {
                let t0 = std::time::Instant::now();
                let result = async {
                    let resp = client
                        .get(url)
                        .query(query)
                        .send()
                        .await
                        .and_then(|r| r.error_for_status())
                        .map_err(|e| UpstreamError::fetch(source, e))?;
                    resp.text().await.map_err(|e| UpstreamError::fetch(source, e))
                }
                .await;

                let ms = t0.elapsed().as_secs_f64() * 1_000.0;
                histogram!("designerboard_fetch_ms", "source" => source.as_str()).record(ms);
                if let Err(e) = &result {
                    tracing::debug!(target: "ingest", error = %e, source = %source, page, "provider http error");
                }
                result
            }
        }
    }
}
