//! # Listing contexts
//! The four listings the site offers and how each one is wired: which
//! providers, in which priority order, with which request parameters, page
//! bounds and merge policy.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::settings::{PagingSettings, Settings};
use crate::coordinator::{FetchCoordinator, Presenter, SourcePlan};
use crate::ingest::providers::behance::{BehanceJobs, BehanceProjects};
use crate::ingest::providers::designer_news::{DesignerNewsJobs, DesignerNewsStories};
use crate::ingest::providers::dribbble::{DribbbleJobs, DribbbleShots};
use crate::ingest::proxy::ScrapeProxy;
use crate::ingest::transport::Transport;
use crate::ingest::types::{PageParams, SourceAdapter};
use crate::merge::MergePolicy;
use crate::pagination::PaginationTracker;

const POST_LAST_PAGE: u32 = 30;
const NEWS_LAST_PAGE: u32 = 30;
const JOBS_LAST_PAGE: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingKind {
    Popular,
    Recent,
    News,
    Jobs,
}

impl ListingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingKind::Popular => "popular",
            ListingKind::Recent => "recent",
            ListingKind::News => "news",
            ListingKind::Jobs => "jobs",
        }
    }

    pub fn policy(&self) -> MergePolicy {
        match self {
            ListingKind::Popular | ListingKind::Jobs => MergePolicy::RoundRobin,
            ListingKind::Recent => MergePolicy::SortedByKey,
            ListingKind::News => MergePolicy::Concatenate,
        }
    }

    /// Sources of this listing in priority order.
    pub fn plans(&self, providers: &ProviderSet, paging: &PagingSettings) -> Vec<SourcePlan> {
        let per_page = paging.per_page.to_string();
        let bounded = |last: u32| PaginationTracker::new(Some(last)).with_safety_cap(paging.safety_cap);
        let plan = |adapter: &Arc<dyn SourceAdapter>, params: PageParams, tracker| SourcePlan {
            adapter: Arc::clone(adapter),
            params,
            tracker,
        };

        match self {
            ListingKind::Popular => vec![
                plan(
                    &providers.dribbble_shots,
                    PageParams::new()
                        .with("path", "shots/popular")
                        .with("per_page", &per_page),
                    bounded(POST_LAST_PAGE).with_page_size(paging.per_page),
                ),
                plan(
                    &providers.behance_projects,
                    PageParams::new().with("sort", "featured_date"),
                    bounded(POST_LAST_PAGE),
                ),
            ],
            ListingKind::Recent => vec![
                plan(
                    &providers.behance_projects,
                    PageParams::new().with("sort", "published_date"),
                    bounded(POST_LAST_PAGE),
                ),
                plan(
                    &providers.dribbble_shots,
                    PageParams::new()
                        .with("path", "shots/everyone")
                        .with("per_page", &per_page),
                    bounded(POST_LAST_PAGE).with_page_size(paging.per_page),
                ),
            ],
            ListingKind::News => vec![plan(
                &providers.designer_news_stories,
                PageParams::new().with("path", "p"),
                bounded(NEWS_LAST_PAGE),
            )],
            ListingKind::Jobs => vec![
                plan(&providers.dribbble_jobs, PageParams::new(), bounded(JOBS_LAST_PAGE)),
                plan(&providers.designer_news_jobs, PageParams::new(), bounded(JOBS_LAST_PAGE)),
                plan(
                    &providers.behance_jobs,
                    PageParams::new()
                        .with("sort", "published_date")
                        .with("status", "current"),
                    if paging.behance_jobs {
                        bounded(JOBS_LAST_PAGE)
                    } else {
                        PaginationTracker::disabled()
                    },
                ),
            ],
        }
    }

    /// Image size toggling only applies to image listings.
    pub fn has_images(&self) -> bool {
        matches!(self, ListingKind::Popular | ListingKind::Recent)
    }
}

impl FromStr for ListingKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "popular" => Ok(ListingKind::Popular),
            "recent" => Ok(ListingKind::Recent),
            "news" => Ok(ListingKind::News),
            "jobs" => Ok(ListingKind::Jobs),
            other => Err(anyhow!("unknown listing: {other}")),
        }
    }
}

/// One adapter per provider and listing flavour.
#[derive(Clone)]
pub struct ProviderSet {
    pub behance_projects: Arc<dyn SourceAdapter>,
    pub behance_jobs: Arc<dyn SourceAdapter>,
    pub dribbble_shots: Arc<dyn SourceAdapter>,
    pub dribbble_jobs: Arc<dyn SourceAdapter>,
    pub designer_news_stories: Arc<dyn SourceAdapter>,
    pub designer_news_jobs: Arc<dyn SourceAdapter>,
}

impl ProviderSet {
    /// Live HTTP adapters configured from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let up = &settings.upstream;
        let transport = Transport::http(Duration::from_secs(up.timeout_secs))
            .context("building upstream http client")?;
        let proxy = || ScrapeProxy::new(&up.scrape_proxy, transport.clone());

        Ok(Self {
            behance_projects: Arc::new(BehanceProjects::new(
                &up.behance_base,
                &up.behance_api_key,
                transport.clone(),
            )),
            behance_jobs: Arc::new(BehanceJobs::new(&up.behance_base, proxy())),
            dribbble_shots: Arc::new(DribbbleShots::new(&up.dribbble_api_base, transport.clone())),
            dribbble_jobs: Arc::new(DribbbleJobs::new(&up.dribbble_site_base, proxy())),
            designer_news_stories: Arc::new(DesignerNewsStories::new(
                &up.designer_news_base,
                proxy(),
            )),
            designer_news_jobs: Arc::new(DesignerNewsJobs::new(&up.designer_news_base, proxy())),
        })
    }
}

/// Per-listing view state handed to the renderer, living exactly as long as the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViewContext {
    pub section: ListingKind,
    pub large_images: bool,
}

impl ViewContext {
    pub fn new(section: ListingKind, large_images: bool) -> Self {
        Self {
            section,
            large_images: section.has_images() && large_images,
        }
    }
}

/// A live listing: its view context plus the coordinator that feeds it.
pub struct Listing {
    pub view: ViewContext,
    pub coordinator: Arc<FetchCoordinator>,
}

impl Listing {
    pub fn open(
        view: ViewContext,
        providers: &ProviderSet,
        paging: &PagingSettings,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        let kind = view.section;
        let coordinator = FetchCoordinator::new(
            kind.as_str(),
            kind.plans(providers, paging),
            kind.policy(),
            presenter,
        );
        Self {
            view,
            coordinator: Arc::new(coordinator),
        }
    }
}

impl Drop for Listing {
    fn drop(&mut self) {
        self.coordinator.teardown();
    }
}
