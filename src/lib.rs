// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod coordinator;
pub mod ingest;
pub mod item;
pub mod listing;
pub mod merge;
pub mod metrics;
pub mod pagination;

pub use crate::api::{router, AppState};
pub use crate::config::Settings;
pub use crate::coordinator::{FetchCoordinator, Presenter, RoundOutcome, SourcePlan};
pub use crate::item::{ItemDetails, NormalizedItem, Source};
pub use crate::listing::{Listing, ListingKind, ProviderSet, ViewContext};
pub use crate::merge::MergePolicy;
pub use crate::pagination::PaginationTracker;
