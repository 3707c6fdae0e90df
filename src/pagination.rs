//! # Pagination Tracker
//! Per-source cursor plus a one-way exhaustion flag.
//!
//! `current_page` only ever grows and `exhausted` only ever flips from false to
//! true (until [`PaginationTracker::reset`]). A source without a known last page
//! is still bounded by `safety_cap`, so an upstream that keeps returning full
//! pages cannot be fetched forever.

use crate::ingest::types::FetchedPage;

pub const DEFAULT_SAFETY_CAP: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationTracker {
    current_page: u32,
    exhausted: bool,
    known_last_page: Option<u32>,
    configured_last_page: Option<u32>,
    page_size: Option<usize>,
    safety_cap: u32,
    disabled: bool,
}

impl PaginationTracker {
    pub fn new(known_last_page: Option<u32>) -> Self {
        Self {
            current_page: 1,
            exhausted: false,
            known_last_page,
            configured_last_page: known_last_page,
            page_size: None,
            safety_cap: DEFAULT_SAFETY_CAP,
            disabled: false,
        }
    }

    /// Pages with fewer upstream records than `size` mark the source exhausted.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn with_safety_cap(mut self, cap: u32) -> Self {
        self.safety_cap = cap.max(1);
        self
    }

    /// Source that contributes nothing to the listing (disabled in configuration).
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::new(None)
        }
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn known_last_page(&self) -> Option<u32> {
        self.known_last_page
    }

    pub fn advance(&mut self) {
        self.current_page = self.current_page.saturating_add(1);
    }

    pub fn mark_exhausted(&mut self) {
        self.exhausted = true;
    }

    pub fn is_exhausted(&self) -> bool {
        self.disabled
            || self.exhausted
            || self.current_page > self.known_last_page.unwrap_or(self.safety_cap)
    }

    /// Fold what a successfully fetched page says about the source's end.
    ///
    /// Call after [`advance`](Self::advance), so a source that just delivered its
    /// last page reads as exhausted from the next round on.
    pub fn observe(&mut self, page: &FetchedPage) {
        if let Some(reported) = page.last_page {
            self.known_last_page = Some(match self.known_last_page {
                Some(configured) => configured.min(reported),
                None => reported,
            });
        }
        if page.upstream_count == 0 {
            self.mark_exhausted();
        } else if let Some(size) = self.page_size {
            if page.upstream_count < size {
                self.mark_exhausted();
            }
        }
    }

    pub fn reset(&mut self) {
        self.current_page = 1;
        self.exhausted = false;
        self.known_last_page = self.configured_last_page;
    }
}
