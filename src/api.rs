use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::config::settings::{PagingSettings, SessionSettings};
use crate::coordinator::{Phase, Presenter, RoundOutcome, SourceCursor};
use crate::item::NormalizedItem;
use crate::listing::{Listing, ListingKind, ProviderSet, ViewContext};

/// Renderer-side view of one listing: what the browser polls for.
#[derive(Debug, Default)]
pub struct FeedPresenter {
    loading: AtomicBool,
    exhausted: AtomicBool,
    rounds: AtomicU64,
}

impl FeedPresenter {
    pub fn loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub fn exhausted(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }

    pub fn rounds(&self) -> u64 {
        self.rounds.load(Ordering::SeqCst)
    }
}

impl Presenter for FeedPresenter {
    fn on_loading(&self, loading: bool) {
        self.loading.store(loading, Ordering::SeqCst);
    }

    fn on_increment_ready(&self, items: &[NormalizedItem]) {
        self.rounds.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(target: "api", items = items.len(), "increment ready");
    }

    fn on_all_exhausted(&self) {
        self.exhausted.store(true, Ordering::SeqCst);
    }
}

struct Session {
    listing: Listing,
    feed: Arc<FeedPresenter>,
    last_access: Mutex<Instant>,
}

impl Session {
    fn touch(&self) {
        *self.last_access.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn last_access(&self) -> Instant {
        *self.last_access.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status(&self) -> StatusOut {
        let coordinator = &self.listing.coordinator;
        StatusOut {
            phase: coordinator.phase(),
            total: coordinator.len(),
            loading: self.feed.loading(),
            exhausted: coordinator.is_exhausted(),
            rounds: self.feed.rounds(),
            cursors: coordinator.cursors(),
        }
    }

    /// Kick a round off without blocking the request.
    fn spawn_next(&self) {
        let coordinator = Arc::clone(&self.listing.coordinator);
        tokio::spawn(async move {
            coordinator.fetch_next().await;
        });
    }
}

#[derive(Clone)]
pub struct AppState {
    sessions: Arc<RwLock<HashMap<Uuid, Arc<Session>>>>,
    providers: ProviderSet,
    paging: PagingSettings,
    limits: SessionSettings,
}

impl AppState {
    pub fn new(providers: ProviderSet, paging: PagingSettings) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            providers,
            paging,
            limits: SessionSettings::default(),
        }
    }

    pub fn with_session_limits(mut self, limits: SessionSettings) -> Self {
        self.limits = limits;
        self
    }

    fn session(&self, id: Uuid) -> Result<Arc<Session>, StatusCode> {
        let guard = self
            .sessions
            .read()
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let session = guard.get(&id).cloned().ok_or(StatusCode::NOT_FOUND)?;
        session.touch();
        Ok(session)
    }

    /// Insert a session, evicting the least recently used ones beyond `max_sessions`.
    fn insert(&self, id: Uuid, session: Arc<Session>) -> Result<(), StatusCode> {
        let evicted = {
            let mut sessions = self
                .sessions
                .write()
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            sessions.insert(id, session);
            let mut evicted = Vec::new();
            while sessions.len() > self.limits.max_sessions.max(1) {
                let oldest = sessions
                    .iter()
                    .filter(|(k, _)| **k != id)
                    .min_by_key(|(_, s)| s.last_access())
                    .map(|(k, _)| *k);
                match oldest.and_then(|k| sessions.remove(&k)) {
                    Some(s) => evicted.push(s),
                    None => break,
                }
            }
            evicted
        };
        for s in &evicted {
            s.listing.coordinator.teardown();
        }
        if !evicted.is_empty() {
            tracing::info!(target: "api", evicted = evicted.len(), "session cap reached");
        }
        Ok(())
    }

    /// Drop sessions nobody has read or advanced for longer than the idle ttl.
    pub fn sweep_idle(&self) -> usize {
        let ttl = Duration::from_secs(self.limits.idle_ttl_secs);
        let now = Instant::now();
        let expired: Vec<Arc<Session>> = match self.sessions.write() {
            Ok(mut sessions) => {
                let ids: Vec<Uuid> = sessions
                    .iter()
                    .filter(|(_, s)| now.saturating_duration_since(s.last_access()) > ttl)
                    .map(|(k, _)| *k)
                    .collect();
                ids.iter().filter_map(|k| sessions.remove(k)).collect()
            }
            Err(_) => return 0,
        };
        for s in &expired {
            s.listing.coordinator.teardown();
        }
        if !expired.is_empty() {
            tracing::info!(target: "api", expired = expired.len(), "idle sessions swept");
        }
        expired.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }
}

/// Periodically evict idle sessions; lives as long as the server.
pub fn spawn_session_sweeper(state: AppState) -> JoinHandle<()> {
    let every = Duration::from_secs(state.limits.sweep_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            state.sweep_idle();
        }
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/listings/{kind}", post(open_listing))
        .route("/api/sessions/{id}", get(read_session).delete(close_session))
        .route("/api/sessions/{id}/next", post(fetch_next))
        .route("/api/sessions/{id}/reset", post(reset_session))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct StatusOut {
    phase: Phase,
    total: usize,
    loading: bool,
    exhausted: bool,
    rounds: u64,
    cursors: Vec<SourceCursor>,
}

#[derive(Deserialize)]
struct OpenQuery {
    #[serde(default = "default_large_images")]
    large_images: bool,
}

fn default_large_images() -> bool {
    true
}

#[derive(Serialize)]
struct OpenOut {
    id: Uuid,
    view: ViewContext,
    status: StatusOut,
}

async fn open_listing(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(q): Query<OpenQuery>,
) -> Result<(StatusCode, Json<OpenOut>), StatusCode> {
    let kind: ListingKind = kind.parse().map_err(|_| StatusCode::NOT_FOUND)?;
    let feed = Arc::new(FeedPresenter::default());
    let listing = Listing::open(
        ViewContext::new(kind, q.large_images),
        &state.providers,
        &state.paging,
        feed.clone(),
    );
    let session = Arc::new(Session {
        listing,
        feed,
        last_access: Mutex::new(Instant::now()),
    });
    let id = Uuid::new_v4();
    state.insert(id, session.clone())?;

    tracing::info!(target: "api", %id, listing = kind.as_str(), "listing opened");
    session.spawn_next();

    Ok((
        StatusCode::CREATED,
        Json(OpenOut {
            id,
            view: session.listing.view,
            status: session.status(),
        }),
    ))
}

#[derive(Deserialize)]
struct ReadQuery {
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    q: String,
}

#[derive(Serialize)]
struct ReadOut {
    view: ViewContext,
    offset: usize,
    items: Vec<NormalizedItem>,
    #[serde(flatten)]
    status: StatusOut,
}

async fn read_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<ReadQuery>,
) -> Result<Json<ReadOut>, StatusCode> {
    let session = state.session(id)?;
    let items = session
        .listing
        .coordinator
        .items_from(q.offset)
        .into_iter()
        .filter(|it| it.matches(&q.q))
        .collect();
    Ok(Json(ReadOut {
        view: session.listing.view,
        offset: q.offset,
        items,
        status: session.status(),
    }))
}

#[derive(Deserialize)]
struct NextQuery {
    /// Wait for the round to merge instead of answering right away.
    #[serde(default)]
    wait: bool,
}

#[derive(Serialize)]
struct NextOut {
    outcome: &'static str,
    added: usize,
    #[serde(flatten)]
    status: StatusOut,
}

async fn fetch_next(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<NextQuery>,
) -> Result<(StatusCode, Json<NextOut>), StatusCode> {
    let session = state.session(id)?;
    if !q.wait {
        session.spawn_next();
        return Ok((
            StatusCode::ACCEPTED,
            Json(NextOut {
                outcome: "scheduled",
                added: 0,
                status: session.status(),
            }),
        ));
    }

    let (outcome, added) = match session.listing.coordinator.fetch_next().await {
        RoundOutcome::Merged { added, .. } => ("merged", added),
        RoundOutcome::Busy => ("busy", 0),
        RoundOutcome::Exhausted => ("exhausted", 0),
        RoundOutcome::Discarded => ("discarded", 0),
    };
    Ok((
        StatusCode::OK,
        Json(NextOut {
            outcome,
            added,
            status: session.status(),
        }),
    ))
}

async fn reset_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<StatusOut>), StatusCode> {
    let session = state.session(id)?;
    session.listing.coordinator.reset();
    session.feed.exhausted.store(false, Ordering::SeqCst);
    session.spawn_next();
    Ok((StatusCode::ACCEPTED, Json(session.status())))
}

async fn close_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> StatusCode {
    let removed = match state.sessions.write() {
        Ok(mut sessions) => sessions.remove(&id),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR,
    };
    match removed {
        Some(session) => {
            session.listing.coordinator.teardown();
            tracing::info!(target: "api", %id, "listing closed");
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}
