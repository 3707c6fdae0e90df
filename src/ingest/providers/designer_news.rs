// src/ingest/providers/designer_news.rs
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::ingest::providers::nodes::{leading_count, Anchor, TextNode};
use crate::ingest::proxy::{OneOrMany, ScrapeProxy};
use crate::ingest::types::{ExtractError, FetchedPage, PageParams, SourceAdapter, UpstreamError};
use crate::ingest::{normalize_text, project_records};
use crate::item::{job_search_index, takes_an, ItemDetails, NormalizedItem, Source};

pub const DEFAULT_BASE: &str = "https://news.layervault.com";

const STORIES_XPATH: &str = "//*[@class='InnerPage']/ol/li";
const JOBS_XPATH: &str = "//div[@class='InnerPage']/ul/li";

static RE_COMPANY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.*?) is looking").unwrap());
static RE_POSITION: Lazy<Regex> = Lazy::new(|| Regex::new(r"is looking for an?\s(.*?)$").unwrap());

#[derive(Debug, Deserialize)]
struct StoryRow {
    a: Option<Anchor>,
    div: Option<StoryMeta>,
}

#[derive(Debug, Deserialize)]
struct StoryMeta {
    span: Option<TextNode>,
    p: Option<StoryLinks>,
}

#[derive(Debug, Deserialize)]
struct StoryLinks {
    a: Option<OneOrMany<Anchor>>,
}

fn story_item(base: &str, row: StoryRow) -> Result<NormalizedItem, ExtractError> {
    let link = row.a.ok_or(ExtractError::Missing("a"))?;
    let title = link
        .content
        .as_deref()
        .map(normalize_text)
        .filter(|t| !t.is_empty())
        .ok_or(ExtractError::Missing("a.content"))?;
    let url = link.href("a.href")?.to_string();

    let meta = row.div.ok_or(ExtractError::Missing("div"))?;
    let points = meta
        .span
        .as_ref()
        .and_then(TextNode::text)
        .map(|t| leading_count(&t))
        .unwrap_or(0);
    let links = meta
        .p
        .and_then(|p| p.a)
        .map(OneOrMany::into_vec)
        .unwrap_or_default();
    let comments_link = links.first().ok_or(ExtractError::Missing("div.p.a[0]"))?;
    let comment_url = format!("{base}{}", comments_link.href("div.p.a[0].href")?);
    let comments = comments_link
        .content
        .as_deref()
        .map(leading_count)
        .unwrap_or(0);
    let user_name = links
        .get(1)
        .and_then(|a| a.content.as_deref())
        .map(normalize_text)
        .filter(|t| !t.is_empty())
        .ok_or(ExtractError::Missing("div.p.a[1].content"))?;

    let id: String = title
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();

    Ok(NormalizedItem {
        id: format!("dn-{id}"),
        source: Source::DesignerNews,
        headline: title,
        url,
        details: ItemDetails::Story {
            comment_url,
            user_name,
            points,
            comments,
        },
        sort_key: None,
    })
}

/// Designer News front page stories (`/p/{page}`), scraped through the query proxy.
pub struct DesignerNewsStories {
    base: String,
    proxy: ScrapeProxy,
}

impl DesignerNewsStories {
    pub fn new(base: &str, proxy: ScrapeProxy) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            proxy,
        }
    }
}

#[async_trait]
impl SourceAdapter for DesignerNewsStories {
    async fn fetch_page(&self, page: u32, params: &PageParams) -> Result<FetchedPage, UpstreamError> {
        let path = params.get("path").unwrap_or("p");
        let page_url = format!("{}/{}/{page}", self.base, path.trim_matches('/'));
        let rows = self
            .proxy
            .select_list_items(Source::DesignerNews, page, &page_url, STORIES_XPATH)
            .await?;
        let upstream_count = rows.len();
        let base = self.base.as_str();
        Ok(FetchedPage {
            items: project_records(Source::DesignerNews, rows, |row: StoryRow| {
                story_item(base, row)
            }),
            upstream_count,
            last_page: None,
        })
    }

    fn source(&self) -> Source {
        Source::DesignerNews
    }

    fn name(&self) -> &'static str {
        "designer-news-stories"
    }
}

#[derive(Debug, Deserialize)]
struct JobRow {
    a: Option<Anchor>,
}

fn job_item(row: JobRow) -> Result<NormalizedItem, ExtractError> {
    let anchor = row.a.ok_or(ExtractError::Missing("a"))?;
    let href = anchor.href("a.href")?.to_string();
    let label = anchor
        .span
        .first()
        .and_then(|s| s.text())
        .ok_or(ExtractError::Missing("a.span[0]"))?;
    let company = RE_COMPANY
        .captures(&label)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .ok_or_else(|| ExtractError::Pattern {
            field: "company",
            value: label.clone(),
        })?;
    let position = RE_POSITION
        .captures(&label)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .ok_or_else(|| ExtractError::Pattern {
            field: "position",
            value: label.clone(),
        })?;
    let location = anchor
        .span
        .get(1)
        .and_then(|s| s.text())
        .ok_or(ExtractError::Missing("a.span[1]"))?;

    let id: String = href
        .chars()
        .filter(|c| !matches!(c, '/' | ':' | '%' | '-' | '.'))
        .collect();

    Ok(NormalizedItem {
        id: format!("dn-job-{id}"),
        source: Source::DesignerNews,
        url: href,
        details: ItemDetails::Job {
            an: takes_an(&position),
            search_index: job_search_index(&company, &position, &location),
            position,
            location,
        },
        headline: company,
        sort_key: None,
    })
}

/// Designer News job board, scraped through the query proxy.
pub struct DesignerNewsJobs {
    base: String,
    proxy: ScrapeProxy,
}

impl DesignerNewsJobs {
    pub fn new(base: &str, proxy: ScrapeProxy) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            proxy,
        }
    }
}

#[async_trait]
impl SourceAdapter for DesignerNewsJobs {
    async fn fetch_page(&self, page: u32, _params: &PageParams) -> Result<FetchedPage, UpstreamError> {
        let page_url = format!("{}/jobs", self.base);
        let rows = self
            .proxy
            .select_list_items(Source::DesignerNews, page, &page_url, JOBS_XPATH)
            .await?;
        let upstream_count = rows.len();
        Ok(FetchedPage {
            items: project_records(Source::DesignerNews, rows, job_item),
            upstream_count,
            last_page: None,
        })
    }

    fn source(&self) -> Source {
        Source::DesignerNews
    }

    fn name(&self) -> &'static str {
        "designer-news-jobs"
    }
}
