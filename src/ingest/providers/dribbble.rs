// src/ingest/providers/dribbble.rs
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;

use crate::ingest::providers::nodes::BoardJobRow;
use crate::ingest::proxy::ScrapeProxy;
use crate::ingest::transport::Transport;
use crate::ingest::types::{ExtractError, FetchedPage, PageParams, SourceAdapter, UpstreamError};
use crate::ingest::{decode_body, normalize_text, project_records};
use crate::item::{
    job_search_index, post_score, takes_an, ItemDetails, NormalizedItem, Source, Stats,
};

pub const DEFAULT_API_BASE: &str = "https://api.dribbble.com";
pub const DEFAULT_SITE_BASE: &str = "https://dribbble.com";

#[derive(Debug, Deserialize)]
struct ShotsPage {
    shots: Vec<serde_json::Value>,
    #[serde(default)]
    pages: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Shot {
    id: Option<u64>,
    title: Option<String>,
    url: Option<String>,
    short_url: Option<String>,
    image_url: Option<String>,
    image_teaser_url: Option<String>,
    player: Option<Player>,
    #[serde(default)]
    views_count: u64,
    #[serde(default)]
    likes_count: u64,
    #[serde(default)]
    comments_count: u64,
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Player {
    name: Option<String>,
    username: Option<String>,
    avatar_url: Option<String>,
}

/// Dribbble timestamps look like `2013/05/01 09:12:44 -0400`; RFC 3339 is accepted too.
fn parse_created_at(ts: &str) -> Option<i64> {
    DateTime::<FixedOffset>::parse_from_str(ts, "%Y/%m/%d %H:%M:%S %z")
        .or_else(|_| DateTime::parse_from_rfc3339(ts))
        .ok()
        .map(|dt| dt.timestamp())
}

fn shot_item(s: Shot) -> Result<NormalizedItem, ExtractError> {
    let id = s.id.ok_or(ExtractError::Missing("id"))?;
    let title = s
        .title
        .as_deref()
        .map(normalize_text)
        .filter(|t| !t.is_empty())
        .ok_or(ExtractError::Missing("title"))?;
    let url = s.url.ok_or(ExtractError::Missing("url"))?;
    let player = s.player.ok_or(ExtractError::Missing("player"))?;
    let user_name = player.name.ok_or(ExtractError::Missing("player.name"))?;

    Ok(NormalizedItem {
        id: format!("dribbble-{id}"),
        source: Source::Dribbble,
        headline: title,
        url,
        details: ItemDetails::Post {
            short_url: s.short_url,
            large_image_url: s.image_url,
            small_image_url: s.image_teaser_url,
            user_name,
            user_nickname: player.username,
            user_picture: player.avatar_url,
            stats: Stats {
                views: s.views_count,
                likes: s.likes_count,
                comments: s.comments_count,
            },
            score: post_score(s.views_count, s.likes_count),
        },
        sort_key: s.created_at.as_deref().and_then(parse_created_at),
    })
}

/// Dribbble shot lists (`shots/popular`, `shots/everyone`, ...); the list is chosen by the `path` param.
pub struct DribbbleShots {
    base: String,
    transport: Transport,
}

impl DribbbleShots {
    pub fn new(base: &str, transport: Transport) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            transport,
        }
    }

    pub fn from_fixture(body: &str) -> Self {
        Self::new(DEFAULT_API_BASE, Transport::fixture(body))
    }

    fn parse_page(body: &str) -> Result<FetchedPage, UpstreamError> {
        let page: ShotsPage = decode_body(Source::Dribbble, body)?;
        let upstream_count = page.shots.len();
        Ok(FetchedPage {
            items: project_records(Source::Dribbble, page.shots, shot_item),
            upstream_count,
            last_page: page.pages,
        })
    }
}

#[async_trait]
impl SourceAdapter for DribbbleShots {
    async fn fetch_page(&self, page: u32, params: &PageParams) -> Result<FetchedPage, UpstreamError> {
        let path = params.get("path").unwrap_or("shots/everyone");
        let url = format!("{}/{}", self.base, path.trim_start_matches('/'));
        let mut query = vec![("page".to_string(), page.to_string())];
        query.extend(
            params
                .iter()
                .filter(|(k, _)| *k != "path")
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
        let body = self.transport.get(Source::Dribbble, page, &url, &query).await?;
        Self::parse_page(&body)
    }

    fn source(&self) -> Source {
        Source::Dribbble
    }

    fn name(&self) -> &'static str {
        "dribbble-shots"
    }
}

/// Dribbble job board, scraped through the query proxy.
pub struct DribbbleJobs {
    base: String,
    proxy: ScrapeProxy,
}

const JOBS_XPATH: &str = "//ol[@class='jobs']/li";

impl DribbbleJobs {
    pub fn new(base: &str, proxy: ScrapeProxy) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            proxy,
        }
    }

    fn job_item(base: &str, row: BoardJobRow) -> Result<NormalizedItem, ExtractError> {
        let job = row.into_job()?;
        Ok(NormalizedItem {
            id: format!("dribbble-job-{}", job.href.replace("/jobs/", "")),
            source: Source::Dribbble,
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

#[async_trait]
impl SourceAdapter for DribbbleJobs {
    async fn fetch_page(&self, page: u32, _params: &PageParams) -> Result<FetchedPage, UpstreamError> {
        let page_url = format!("{}/jobs", self.base);
        let rows = self
            .proxy
            .select_list_items(Source::Dribbble, page, &page_url, JOBS_XPATH)
            .await?;
        let upstream_count = rows.len();
        let base = self.base.as_str();
        Ok(FetchedPage {
            items: project_records(Source::Dribbble, rows, |row: BoardJobRow| {
                Self::job_item(base, row)
            }),
            upstream_count,
            last_page: None,
        })
    }

    fn source(&self) -> Source {
        Source::Dribbble
    }

    fn name(&self) -> &'static str {
        "dribbble-jobs"
    }
}
