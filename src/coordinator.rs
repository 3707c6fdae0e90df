//! # Fetch Coordinator
//! Runs fetch rounds for one listing: fans out to every source that still has
//! pages, waits for all of them to settle, advances the per-source trackers,
//! merges the round and appends the increment to the unified list.
//!
//! ```text
//! Idle --fetch_next--> Fetching --all settled--> Merging --> Idle
//!   \                                               \
//!    `--no eligible source--> AllExhausted <---------`--all trackers exhausted
//! ```
//!
//! Only one round is in flight at a time; `fetch_next` while `Fetching` is a
//! no-op. A source that fails keeps its page and is retried next round. Rounds
//! that complete after [`FetchCoordinator::teardown`] or after a
//! [`FetchCoordinator::reset`] are dropped without touching state. A round whose
//! `fetch_next` future is dropped before settling goes back to `Idle` with
//! every cursor where it was.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ingest::ensure_metrics_described;
use crate::ingest::types::{FetchedPage, PageParams, SourceAdapter, UpstreamError};
use crate::item::{NormalizedItem, Source};
use crate::merge::MergePolicy;
use crate::pagination::PaginationTracker;

/// Receiver of round results (the renderer side of a listing).
pub trait Presenter: Send + Sync {
    /// Loading indicator: on when a round is issued, off when it has merged.
    fn on_loading(&self, _loading: bool) {}
    /// Exactly the items a completed round appended.
    fn on_increment_ready(&self, items: &[NormalizedItem]);
    /// First time every source is exhausted.
    fn on_all_exhausted(&self);
}

/// One source of a listing, in priority order.
pub struct SourcePlan {
    pub adapter: Arc<dyn SourceAdapter>,
    pub params: PageParams,
    pub tracker: PaginationTracker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Fetching,
    Merging,
    AllExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Round merged; `failed` lists the sources whose page will be retried.
    Merged { added: usize, failed: Vec<Source> },
    /// A round is already in flight.
    Busy,
    /// Every source is exhausted.
    Exhausted,
    /// The listing was torn down or reset while the round was out.
    Discarded,
}

/// Cursor snapshot for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceCursor {
    pub source: Source,
    pub adapter: &'static str,
    pub page: u32,
    pub exhausted: bool,
}

type Settled = (usize, u32, Result<FetchedPage, UpstreamError>);

struct Slot {
    adapter: Arc<dyn SourceAdapter>,
    params: PageParams,
}

struct State {
    phase: Phase,
    epoch: u64,
    round: u64,
    trackers: Vec<PaginationTracker>,
    round_buffer: Vec<Vec<NormalizedItem>>,
    list: Vec<NormalizedItem>,
    exhausted_notified: bool,
}

struct RoundPlan {
    epoch: u64,
    round: u64,
    requests: Vec<(usize, u32)>,
}

struct AbandonedRound<'a> {
    coordinator: &'a FetchCoordinator,
    epoch: u64,
    armed: bool,
}

impl Drop for AbandonedRound<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.coordinator.abandon(self.epoch);
        }
    }
}

pub struct FetchCoordinator {
    label: String,
    slots: Vec<Slot>,
    policy: MergePolicy,
    presenter: Arc<dyn Presenter>,
    state: Mutex<State>,
    liveness: CancellationToken,
}

impl FetchCoordinator {
    pub fn new(
        label: &str,
        plans: Vec<SourcePlan>,
        policy: MergePolicy,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        ensure_metrics_described();
        let mut slots = Vec::with_capacity(plans.len());
        let mut trackers = Vec::with_capacity(plans.len());
        for plan in plans {
            slots.push(Slot {
                adapter: plan.adapter,
                params: plan.params,
            });
            trackers.push(plan.tracker);
        }
        let round_buffer = vec![Vec::new(); slots.len()];
        Self {
            label: label.to_string(),
            slots,
            policy,
            presenter,
            state: Mutex::new(State {
                phase: Phase::Idle,
                epoch: 0,
                round: 0,
                trackers,
                round_buffer,
                list: Vec::new(),
                exhausted_notified: false,
            }),
            liveness: CancellationToken::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one round. Returns without side effects when a round is already out
    /// or the listing is exhausted or torn down.
    pub async fn fetch_next(&self) -> RoundOutcome {
        if self.liveness.is_cancelled() {
            return RoundOutcome::Discarded;
        }
        let plan = match self.begin_round() {
            Ok(plan) => plan,
            Err(outcome) => return outcome,
        };

        debug!(
            target: "coordinator",
            listing = %self.label,
            round = plan.round,
            sources = plan.requests.len(),
            "round issued"
        );
        // until settle runs, a dropped future hands the round back
        let mut guard = AbandonedRound {
            coordinator: self,
            epoch: plan.epoch,
            armed: true,
        };
        self.presenter.on_loading(true);
        let t0 = Instant::now();
        let settled = self.issue(&plan.requests).await;
        guard.armed = false;
        let outcome = self.settle(&plan, settled);

        if matches!(outcome, RoundOutcome::Merged { .. }) {
            let ms = t0.elapsed().as_secs_f64() * 1_000.0;
            histogram!("designerboard_round_ms").record(ms);
        }
        outcome
    }

    fn begin_round(&self) -> Result<RoundPlan, RoundOutcome> {
        let notify = {
            let mut st = self.lock();
            match st.phase {
                Phase::Fetching | Phase::Merging => return Err(RoundOutcome::Busy),
                Phase::AllExhausted => return Err(RoundOutcome::Exhausted),
                Phase::Idle => {}
            }

            let requests: Vec<(usize, u32)> = st
                .trackers
                .iter()
                .enumerate()
                .filter(|(_, t)| !t.is_exhausted())
                .map(|(slot, t)| (slot, t.current_page()))
                .collect();

            if !requests.is_empty() {
                st.phase = Phase::Fetching;
                st.round += 1;
                return Ok(RoundPlan {
                    epoch: st.epoch,
                    round: st.round,
                    requests,
                });
            }

            st.phase = Phase::AllExhausted;
            !std::mem::replace(&mut st.exhausted_notified, true)
        };

        if notify {
            info!(target: "coordinator", listing = %self.label, "all sources exhausted");
            self.presenter.on_all_exhausted();
        }
        Err(RoundOutcome::Exhausted)
    }

    /// Fetch every requested page concurrently; results come back in slot order.
    async fn issue(&self, requests: &[(usize, u32)]) -> Vec<Settled> {
        let mut set = JoinSet::new();
        for &(slot, page) in requests {
            let adapter = Arc::clone(&self.slots[slot].adapter);
            let params = self.slots[slot].params.clone();
            set.spawn(async move {
                let result = adapter.fetch_page(page, &params).await;
                (slot, page, result)
            });
        }

        let mut settled: Vec<Settled> = Vec::with_capacity(requests.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(done) => settled.push(done),
                Err(e) => warn!(target: "coordinator", listing = %self.label, error = %e, "adapter task died"),
            }
        }

        // a task that panicked still counts as settled, as a failure
        for &(slot, page) in requests {
            if !settled.iter().any(|(s, _, _)| *s == slot) {
                let source = self.slots[slot].adapter.source();
                settled.push((slot, page, Err(UpstreamError::fetch(source, "adapter task aborted"))));
            }
        }
        settled.sort_by_key(|(slot, _, _)| *slot);
        settled
    }

    fn settle(&self, plan: &RoundPlan, settled: Vec<Settled>) -> RoundOutcome {
        let (increment, failed, notify_exhausted) = {
            let mut st = self.lock();
            if self.liveness.is_cancelled() || st.epoch != plan.epoch {
                let newer_round_out = st.phase == Phase::Fetching;
                drop(st);
                debug!(target: "coordinator", listing = %self.label, round = plan.round, "late round discarded");
                // reset may have cleared loading before this round switched it on
                if !newer_round_out && self.is_live() {
                    self.presenter.on_loading(false);
                }
                return RoundOutcome::Discarded;
            }
            st.phase = Phase::Merging;

            let mut failed = Vec::new();
            for (slot, page, result) in settled {
                let adapter = &self.slots[slot].adapter;
                match result {
                    Ok(fetched) => {
                        let tracker = &mut st.trackers[slot];
                        tracker.advance();
                        tracker.observe(&fetched);
                        debug!(
                            target: "coordinator",
                            listing = %self.label,
                            source = %adapter.source(),
                            page,
                            items = fetched.items.len(),
                            exhausted = tracker.is_exhausted(),
                            "page accepted"
                        );
                        st.round_buffer[slot] = fetched.items;
                    }
                    Err(e) => {
                        warn!(
                            target: "coordinator",
                            listing = %self.label,
                            source = %adapter.source(),
                            adapter = adapter.name(),
                            page,
                            error = %e,
                            "source failed, page kept for retry"
                        );
                        counter!("designerboard_source_errors_total", "source" => adapter.source().as_str())
                            .increment(1);
                        failed.push(adapter.source());
                    }
                }
            }

            let empty = vec![Vec::new(); self.slots.len()];
            let buffers = std::mem::replace(&mut st.round_buffer, empty);
            let increment = self.policy.merge(buffers);
            st.list.extend(increment.iter().cloned());

            let all_exhausted = st.trackers.iter().all(PaginationTracker::is_exhausted);
            st.phase = if all_exhausted {
                Phase::AllExhausted
            } else {
                Phase::Idle
            };
            let notify = all_exhausted && !std::mem::replace(&mut st.exhausted_notified, true);
            (increment, failed, notify)
        };

        counter!("designerboard_rounds_total").increment(1);
        counter!("designerboard_items_merged_total").increment(increment.len() as u64);
        info!(
            target: "coordinator",
            listing = %self.label,
            round = plan.round,
            added = increment.len(),
            failed = failed.len(),
            "round merged"
        );

        self.presenter.on_loading(false);
        self.presenter.on_increment_ready(&increment);
        if notify_exhausted {
            info!(target: "coordinator", listing = %self.label, "all sources exhausted");
            self.presenter.on_all_exhausted();
        }

        RoundOutcome::Merged {
            added: increment.len(),
            failed,
        }
    }

    /// The round of `epoch` was dropped before it settled: nothing is merged and
    /// trackers keep their pages, so the same pages go out next round.
    fn abandon(&self, epoch: u64) {
        let (released, clear_loading) = {
            let mut st = self.lock();
            let fetching = st.phase == Phase::Fetching;
            if st.epoch == epoch && fetching {
                st.phase = Phase::Idle;
                st.round_buffer.iter_mut().for_each(Vec::clear);
                (true, true)
            } else {
                // overtaken by a reset; only touch loading if no newer round is out
                (false, !fetching)
            }
        };
        if released {
            warn!(target: "coordinator", listing = %self.label, "round abandoned before settling");
        }
        if clear_loading && self.is_live() {
            self.presenter.on_loading(false);
        }
    }

    /// Back to page 1 everywhere with an empty list. A round still in flight is discarded.
    pub fn reset(&self) {
        let was_fetching = {
            let mut st = self.lock();
            let was_fetching = st.phase == Phase::Fetching;
            st.epoch += 1;
            st.phase = Phase::Idle;
            st.trackers.iter_mut().for_each(PaginationTracker::reset);
            st.round_buffer.iter_mut().for_each(Vec::clear);
            st.list.clear();
            st.exhausted_notified = false;
            was_fetching
        };
        info!(target: "coordinator", listing = %self.label, "listing reset");
        if was_fetching && self.is_live() {
            self.presenter.on_loading(false);
        }
    }

    /// The listing has no consumer any more; outstanding rounds land nowhere.
    pub fn teardown(&self) {
        self.liveness.cancel();
        debug!(target: "coordinator", listing = %self.label, "listing torn down");
    }

    pub fn is_live(&self) -> bool {
        !self.liveness.is_cancelled()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn is_exhausted(&self) -> bool {
        self.phase() == Phase::AllExhausted
    }

    pub fn len(&self) -> usize {
        self.lock().list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn items(&self) -> Vec<NormalizedItem> {
        self.lock().list.clone()
    }

    /// Unified list from `offset` on (what a renderer has not drawn yet).
    pub fn items_from(&self, offset: usize) -> Vec<NormalizedItem> {
        let st = self.lock();
        st.list.get(offset..).map(<[_]>::to_vec).unwrap_or_default()
    }

    pub fn cursors(&self) -> Vec<SourceCursor> {
        let st = self.lock();
        self.slots
            .iter()
            .zip(st.trackers.iter())
            .map(|(slot, t)| SourceCursor {
                source: slot.adapter.source(),
                adapter: slot.adapter.name(),
                page: t.current_page(),
                exhausted: t.is_exhausted(),
            })
            .collect()
    }
}
