// src/ingest/mod.rs
pub mod providers;
pub mod proxy;
pub mod transport;
pub mod types;

use crate::ingest::types::{ExtractError, UpstreamError};
use crate::item::{NormalizedItem, Source};
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "designerboard_rounds_total",
            "Fetch rounds merged by listing coordinators."
        );
        describe_counter!(
            "designerboard_items_merged_total",
            "Items appended to unified lists."
        );
        describe_counter!(
            "designerboard_source_errors_total",
            "Provider fetch/parse failures per source."
        );
        describe_counter!(
            "designerboard_records_skipped_total",
            "Upstream records dropped during projection."
        );
        describe_histogram!("designerboard_round_ms", "Round latency in milliseconds.");
        describe_histogram!(
            "designerboard_fetch_ms",
            "Upstream page fetch latency in milliseconds."
        );
    });
}

/// Normalize scraped text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Unwrap a JSONP body (`cb({...});`) to its JSON payload. Plain JSON passes through.
pub fn strip_jsonp(body: &str) -> &str {
    let trimmed = body.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return trimmed;
    }
    match (trimmed.find('('), trimmed.rfind(')')) {
        (Some(open), Some(close)) if open < close => trimmed[open + 1..close].trim(),
        _ => trimmed,
    }
}

/// Decode a (possibly JSONP-wrapped) response body into its page-level schema.
pub(crate) fn decode_body<T: DeserializeOwned>(source: Source, body: &str) -> Result<T, UpstreamError> {
    serde_json::from_str(strip_jsonp(body)).map_err(|e| UpstreamError::parse(source, e))
}

/// Project raw records through a typed schema, skipping (and logging) the ones that fail.
pub(crate) fn project_records<R, F>(
    source: Source,
    records: Vec<serde_json::Value>,
    project: F,
) -> Vec<NormalizedItem>
where
    R: DeserializeOwned,
    F: Fn(R) -> Result<NormalizedItem, ExtractError>,
{
    let mut out = Vec::with_capacity(records.len());
    for (index, raw) in records.into_iter().enumerate() {
        let projected = serde_json::from_value::<R>(raw)
            .map_err(|e| ExtractError::Shape(e.to_string()))
            .and_then(&project);
        match projected {
            Ok(item) => out.push(item),
            Err(e) => {
                tracing::warn!(target: "ingest", source = %source, index, error = %e, "record skipped");
                counter!("designerboard_records_skipped_total", "source" => source.as_str())
                    .increment(1);
            }
        }
    }
    out
}
