//! # Normalized items
//! The canonical record shape every provider record is projected into.
//!
//! Ids are derived from upstream identifying fields only, so the same upstream
//! record always maps to the same id across fetches.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream content provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Behance,
    Dribbble,
    DesignerNews,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Behance => "behance",
            Source::Dribbble => "dribbble",
            Source::DesignerNews => "designer_news",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
}

/// Source-dependent secondary fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemDetails {
    /// A showcase post (Behance project, Dribbble shot).
    Post {
        short_url: Option<String>,
        large_image_url: Option<String>,
        small_image_url: Option<String>,
        user_name: String,
        user_nickname: Option<String>,
        user_picture: Option<String>,
        stats: Stats,
        score: u64,
    },
    /// A news story.
    Story {
        comment_url: String,
        user_name: String,
        points: u64,
        comments: u64,
    },
    /// A job listing; `headline` holds the company.
    Job {
        position: String,
        location: String,
        /// Position starts with a vowel (or `h`), so the renderer writes "an".
        an: bool,
        search_index: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub id: String,
    pub source: Source,
    /// Title for posts and stories, company for jobs.
    pub headline: String,
    pub url: String,
    pub details: ItemDetails,
    /// Unix seconds; only consulted by the sorted merge.
    pub sort_key: Option<i64>,
}

impl NormalizedItem {
    /// Jobs search: every query word must appear in the job's search index.
    ///
    /// The empty query matches everything; non-job items only match the empty query.
    pub fn matches(&self, query: &str) -> bool {
        let words = query_words(query);
        if words.is_empty() {
            return true;
        }
        match &self.details {
            ItemDetails::Job { search_index, .. } => {
                words.iter().all(|w| search_index.contains(w.as_str()))
            }
            _ => false,
        }
    }
}

/// Popularity score shared by Behance and Dribbble posts.
pub fn post_score(views: u64, likes: u64) -> u64 {
    views.saturating_add(likes.saturating_mul(10))
}

/// "a" vs "an" before a position title.
pub fn takes_an(position: &str) -> bool {
    matches!(
        position.trim().chars().next().map(|c| c.to_ascii_lowercase()),
        Some('a' | 'e' | 'i' | 'o' | 'u' | 'h')
    )
}

pub fn job_search_index(company: &str, position: &str, location: &str) -> String {
    format!("{company}{position}{location}").to_lowercase()
}

fn query_words(query: &str) -> Vec<String> {
    query
        .split(|c: char| c == ',' || c == '.' || c == ';' || c == ':' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}
