// src/ingest/providers/behance.rs
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use crate::ingest::providers::nodes::BoardJobRow;
use crate::ingest::proxy::ScrapeProxy;
use crate::ingest::transport::Transport;
use crate::ingest::types::{ExtractError, FetchedPage, PageParams, SourceAdapter, UpstreamError};
use crate::ingest::{decode_body, normalize_text, project_records};
use crate::item::{
    job_search_index, post_score, takes_an, ItemDetails, NormalizedItem, Source, Stats,
};

pub const DEFAULT_BASE: &str = "https://www.behance.net";

#[derive(Debug, Deserialize)]
struct ProjectsPage {
    projects: Vec<serde_json::Value>,
    #[serde(default)]
    total_pages: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Project {
    id: Option<u64>,
    name: Option<String>,
    url: Option<String>,
    short_url: Option<String>,
    #[serde(default)]
    covers: HashMap<String, String>,
    #[serde(default)]
    owners: Vec<Owner>,
    #[serde(default)]
    stats: ProjectStats,
    created_on: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Owner {
    display_name: Option<String>,
    username: Option<String>,
    #[serde(default)]
    images: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProjectStats {
    #[serde(default)]
    views: u64,
    #[serde(default)]
    appreciations: u64,
    #[serde(default)]
    comments: u64,
}

fn project_item(p: Project) -> Result<NormalizedItem, ExtractError> {
    let id = p.id.ok_or(ExtractError::Missing("id"))?;
    let title = p
        .name
        .as_deref()
        .map(normalize_text)
        .filter(|t| !t.is_empty())
        .ok_or(ExtractError::Missing("name"))?;
    let url = p.url.ok_or(ExtractError::Missing("url"))?;
    let owner = p.owners.into_iter().next().ok_or(ExtractError::Missing("owners[0]"))?;
    let user_name = owner
        .display_name
        .ok_or(ExtractError::Missing("owners[0].display_name"))?;
    let cover = p.covers.get("404").cloned();

    Ok(NormalizedItem {
        id: format!("behance-{id}"),
        source: Source::Behance,
        headline: title,
        url,
        details: ItemDetails::Post {
            short_url: p.short_url,
            large_image_url: cover.clone(),
            small_image_url: cover,
            user_name,
            user_nickname: owner.username,
            user_picture: owner.images.get("138").cloned(),
            stats: Stats {
                views: p.stats.views,
                likes: p.stats.appreciations,
                comments: p.stats.comments,
            },
            score: post_score(p.stats.views, p.stats.appreciations),
        },
        sort_key: p.created_on,
    })
}

/// Behance project listing via the public v2 API.
pub struct BehanceProjects {
    base: String,
    api_key: String,
    transport: Transport,
}

impl BehanceProjects {
    pub fn new(base: &str, api_key: &str, transport: Transport) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            transport,
        }
    }

    pub fn from_fixture(body: &str) -> Self {
        Self::new(DEFAULT_BASE, "", Transport::fixture(body))
    }

    fn parse_page(body: &str) -> Result<FetchedPage, UpstreamError> {
        let page: ProjectsPage = decode_body(Source::Behance, body)?;
        let upstream_count = page.projects.len();
        Ok(FetchedPage {
            items: project_records(Source::Behance, page.projects, project_item),
            upstream_count,
            last_page: page.total_pages,
        })
    }
}

#[async_trait]
impl SourceAdapter for BehanceProjects {
    async fn fetch_page(&self, page: u32, params: &PageParams) -> Result<FetchedPage, UpstreamError> {
        let url = format!("{}/v2/projects", self.base);
        let mut query = vec![
            ("api_key".to_string(), self.api_key.clone()),
            ("page".to_string(), page.to_string()),
        ];
        query.extend(params.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        let body = self.transport.get(Source::Behance, page, &url, &query).await?;
        Self::parse_page(&body)
    }

    fn source(&self) -> Source {
        Source::Behance
    }

    fn name(&self) -> &'static str {
        "behance-projects"
    }
}

/// Behance job board, scraped through the query proxy.
pub struct BehanceJobs {
    base: String,
    proxy: ScrapeProxy,
}

const JOBS_XPATH: &str = "//ul[@class='job-list']/li";

impl BehanceJobs {
    pub fn new(base: &str, proxy: ScrapeProxy) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            proxy,
        }
    }

    fn job_item(base: &str, row: BoardJobRow) -> Result<NormalizedItem, ExtractError> {
        let job = row.into_job()?;
        Ok(NormalizedItem {
            id: format!("behance-job-{}", job.href.replace("/jobs/", "")),
            source: Source::Behance,
            url: format!("{base}{}", job.href),
            details: ItemDetails::Job {
                an: takes_an(&job.position),
                search_index: job_search_index(&job.company, &job.position, &job.location),
                position: job.position,
                location: job.location,
            },
            headline: job.company,
            sort_key: None,
        })
    }
}

/// Job board page address; filter values are form-encoded.
fn joblist_url(base: &str, page: u32, params: &PageParams) -> Result<String, UpstreamError> {
    let page = page.to_string();
    let query = std::iter::once(("page", page.as_str())).chain(params.iter());
    reqwest::Url::parse_with_params(&format!("{base}/joblist"), query)
        .map(String::from)
        .map_err(|e| UpstreamError::fetch(Source::Behance, e))
}

#[async_trait]
impl SourceAdapter for BehanceJobs {
    async fn fetch_page(&self, page: u32, params: &PageParams) -> Result<FetchedPage, UpstreamError> {
        let page_url = joblist_url(&self.base, page, params)?;
        let rows = self
            .proxy
            .select_list_items(Source::Behance, page, &page_url, JOBS_XPATH)
            .await?;
        let upstream_count = rows.len();
        let base = self.base.as_str();
        Ok(FetchedPage {
            items: project_records(Source::Behance, rows, |row: BoardJobRow| Self::job_item(base, row)),
            upstream_count,
            last_page: None,
        })
    }

    fn source(&self) -> Source {
        Source::Behance
    }

    fn name(&self) -> &'static str {
        "behance-jobs"
    }
}
