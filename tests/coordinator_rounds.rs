// tests/coordinator_rounds.rs
//
// Round semantics of the fetch coordinator against scripted adapters:
// fan-out, retry on failure, exhaustion, re-entrancy, teardown and reset.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use designerboard::coordinator::Phase;
use designerboard::ingest::types::{FetchedPage, PageParams, SourceAdapter, UpstreamError};
use designerboard::item::{ItemDetails, NormalizedItem, Source};
use designerboard::{FetchCoordinator, MergePolicy, PaginationTracker, Presenter, RoundOutcome, SourcePlan};

struct Scripted {
    source: Source,
    tag: &'static str,
    per_page: usize,
    empty_from: Option<u32>,
    failures_left: AtomicUsize,
    panics_left: AtomicUsize,
    delay: Duration,
    gate: Option<Arc<Notify>>,
    calls: Mutex<Vec<u32>>,
}

impl Scripted {
    fn new(source: Source, tag: &'static str) -> Self {
        Self {
            source,
            tag,
            per_page: 2,
            empty_from: None,
            failures_left: AtomicUsize::new(0),
            panics_left: AtomicUsize::new(0),
            delay: Duration::ZERO,
            gate: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing(self, times: usize) -> Self {
        self.failures_left.store(times, Ordering::SeqCst);
        self
    }

    fn panicking(self, times: usize) -> Self {
        self.panics_left.store(times, Ordering::SeqCst);
        self
    }

    fn delayed(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn empty_from(mut self, page: u32) -> Self {
        self.empty_from = Some(page);
        self
    }

    fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }
}

fn item(source: Source, id: String, key: i64) -> NormalizedItem {
    NormalizedItem {
        headline: id.clone(),
        url: format!("https://example.test/{id}"),
        id,
        source,
        details: ItemDetails::Story {
            comment_url: String::new(),
            user_name: "tester".into(),
            points: 0,
            comments: 0,
        },
        sort_key: Some(key),
    }
}

#[async_trait]
impl SourceAdapter for Scripted {
    async fn fetch_page(&self, page: u32, _params: &PageParams) -> Result<FetchedPage, UpstreamError> {
        self.calls.lock().unwrap().push(page);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self
            .panics_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            panic!("scripted adapter panic on page {page}");
        }
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(UpstreamError::fetch(self.source, "scripted failure"));
        }
        if self.empty_from.is_some_and(|p| page >= p) {
            return Ok(FetchedPage::new(Vec::new()));
        }
        let items = (0..self.per_page)
            .map(|i| {
                item(
                    self.source,
                    format!("{}-p{page}-{i}", self.tag),
                    i64::from(page) * 100 - i as i64,
                )
            })
            .collect();
        Ok(FetchedPage::new(items))
    }

    fn source(&self) -> Source {
        self.source
    }

    fn name(&self) -> &'static str {
        self.tag
    }
}

#[derive(Default)]
struct Recorder {
    loading: Mutex<Vec<bool>>,
    increments: Mutex<Vec<Vec<String>>>,
    exhausted: AtomicUsize,
}

impl Presenter for Recorder {
    fn on_loading(&self, loading: bool) {
        self.loading.lock().unwrap().push(loading);
    }

    fn on_increment_ready(&self, items: &[NormalizedItem]) {
        self.increments
            .lock()
            .unwrap()
            .push(items.iter().map(|i| i.id.clone()).collect());
    }

    fn on_all_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::SeqCst);
    }
}

fn plan(adapter: &Arc<Scripted>, last: Option<u32>) -> SourcePlan {
    SourcePlan {
        adapter: adapter.clone(),
        params: PageParams::new(),
        tracker: PaginationTracker::new(last),
    }
}

fn coordinator(plans: Vec<SourcePlan>, policy: MergePolicy, rec: &Arc<Recorder>) -> Arc<FetchCoordinator> {
    Arc::new(FetchCoordinator::new("test", plans, policy, rec.clone()))
}

fn ids(items: &[NormalizedItem]) -> Vec<&str> {
    items.iter().map(|i| i.id.as_str()).collect()
}

async fn wait_for_calls(adapter: &Scripted, n: usize) {
    while adapter.calls().len() < n {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn first_round_fetches_page_one_from_every_source() {
    let a = Arc::new(Scripted::new(Source::Dribbble, "a"));
    let b = Arc::new(Scripted::new(Source::Behance, "b"));
    let rec = Arc::new(Recorder::default());
    let c = coordinator(vec![plan(&a, Some(3)), plan(&b, Some(3))], MergePolicy::RoundRobin, &rec);

    let out = c.fetch_next().await;
    assert_eq!(out, RoundOutcome::Merged { added: 4, failed: vec![] });
    assert_eq!(a.calls(), [1]);
    assert_eq!(b.calls(), [1]);
    assert_eq!(ids(&c.items()), ["a-p1-0", "b-p1-0", "a-p1-1", "b-p1-1"]);
    assert_eq!(*rec.loading.lock().unwrap(), [true, false]);
    assert_eq!(rec.increments.lock().unwrap().len(), 1);
    assert_eq!(c.phase(), Phase::Idle);
}

#[tokio::test]
async fn rounds_converge_and_exhaustion_is_announced_once() {
    let a = Arc::new(Scripted::new(Source::Dribbble, "a"));
    let b = Arc::new(Scripted::new(Source::Behance, "b"));
    let rec = Arc::new(Recorder::default());
    let c = coordinator(vec![plan(&a, Some(2)), plan(&b, Some(3))], MergePolicy::RoundRobin, &rec);

    for _ in 0..3 {
        assert!(matches!(c.fetch_next().await, RoundOutcome::Merged { .. }));
    }
    assert!(c.is_exhausted());
    assert_eq!(rec.exhausted.load(Ordering::SeqCst), 1);

    // exhausted sources are never asked again
    assert_eq!(c.fetch_next().await, RoundOutcome::Exhausted);
    assert_eq!(c.fetch_next().await, RoundOutcome::Exhausted);
    assert_eq!(a.calls(), [1, 2]);
    assert_eq!(b.calls(), [1, 2, 3]);
    assert_eq!(rec.exhausted.load(Ordering::SeqCst), 1);
    assert_eq!(c.len(), 10);

    let last = rec.increments.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last, ["b-p3-0", "b-p3-1"]);
}

#[tokio::test]
async fn failed_source_keeps_its_page_for_the_next_round() {
    let a = Arc::new(Scripted::new(Source::Dribbble, "a"));
    let b = Arc::new(Scripted::new(Source::Behance, "b").failing(1));
    let rec = Arc::new(Recorder::default());
    let c = coordinator(vec![plan(&a, Some(5)), plan(&b, Some(5))], MergePolicy::RoundRobin, &rec);

    let out = c.fetch_next().await;
    assert_eq!(
        out,
        RoundOutcome::Merged {
            added: 2,
            failed: vec![Source::Behance]
        }
    );
    assert_eq!(ids(&c.items()), ["a-p1-0", "a-p1-1"]);
    let cursors = c.cursors();
    assert_eq!(cursors[0].page, 2);
    assert_eq!(cursors[1].page, 1);
    assert!(!cursors[1].exhausted);

    c.fetch_next().await;
    assert_eq!(a.calls(), [1, 2]);
    assert_eq!(b.calls(), [1, 1]);
    assert_eq!(
        ids(&c.items()[2..]),
        ["a-p2-0", "b-p1-0", "a-p2-1", "b-p1-1"]
    );
}

#[tokio::test]
async fn a_round_where_everything_fails_adds_nothing() {
    let a = Arc::new(Scripted::new(Source::DesignerNews, "a").failing(1));
    let rec = Arc::new(Recorder::default());
    let c = coordinator(vec![plan(&a, Some(2))], MergePolicy::Concatenate, &rec);

    let out = c.fetch_next().await;
    assert_eq!(
        out,
        RoundOutcome::Merged {
            added: 0,
            failed: vec![Source::DesignerNews]
        }
    );
    assert!(c.is_empty());
    // the presenter still hears about the (empty) round and loading goes off
    assert_eq!(rec.increments.lock().unwrap().as_slice(), [Vec::<String>::new()]);
    assert_eq!(*rec.loading.lock().unwrap(), [true, false]);
    assert_eq!(c.cursors()[0].page, 1);
}

#[tokio::test]
async fn fetch_next_during_a_round_is_a_no_op() {
    let gate = Arc::new(Notify::new());
    let a = Arc::new(Scripted::new(Source::Dribbble, "a").gated(gate.clone()));
    let rec = Arc::new(Recorder::default());
    let c = coordinator(vec![plan(&a, Some(3))], MergePolicy::RoundRobin, &rec);

    let first = tokio::spawn({
        let c = c.clone();
        async move { c.fetch_next().await }
    });
    wait_for_calls(&a, 1).await;
    assert_eq!(c.phase(), Phase::Fetching);

    assert_eq!(c.fetch_next().await, RoundOutcome::Busy);
    assert_eq!(a.calls(), [1]);

    gate.notify_one();
    assert!(matches!(first.await.unwrap(), RoundOutcome::Merged { added: 2, .. }));
    assert_eq!(c.phase(), Phase::Idle);
}

#[tokio::test]
async fn late_round_after_teardown_is_discarded() {
    let gate = Arc::new(Notify::new());
    let a = Arc::new(Scripted::new(Source::Dribbble, "a").gated(gate.clone()));
    let rec = Arc::new(Recorder::default());
    let c = coordinator(vec![plan(&a, Some(3))], MergePolicy::RoundRobin, &rec);

    let round = tokio::spawn({
        let c = c.clone();
        async move { c.fetch_next().await }
    });
    wait_for_calls(&a, 1).await;
    c.teardown();
    gate.notify_one();

    assert_eq!(round.await.unwrap(), RoundOutcome::Discarded);
    assert!(c.is_empty());
    assert!(rec.increments.lock().unwrap().is_empty());
    assert_eq!(c.fetch_next().await, RoundOutcome::Discarded);
    assert_eq!(a.calls(), [1]);
}

#[tokio::test]
async fn reset_mid_round_drops_the_round_and_starts_over() {
    let gate = Arc::new(Notify::new());
    let a = Arc::new(Scripted::new(Source::Dribbble, "a").gated(gate.clone()));
    let rec = Arc::new(Recorder::default());
    let c = coordinator(vec![plan(&a, Some(3))], MergePolicy::RoundRobin, &rec);

    let round = tokio::spawn({
        let c = c.clone();
        async move { c.fetch_next().await }
    });
    wait_for_calls(&a, 1).await;
    c.reset();
    assert_eq!(*rec.loading.lock().unwrap(), [true, false]);
    gate.notify_one();
    assert_eq!(round.await.unwrap(), RoundOutcome::Discarded);
    assert!(c.is_empty());
    // the discarded round leaves the indicator off
    assert_eq!(rec.loading.lock().unwrap().last(), Some(&false));

    gate.notify_one();
    assert!(matches!(c.fetch_next().await, RoundOutcome::Merged { added: 2, .. }));
    assert_eq!(a.calls(), [1, 1]);
    assert_eq!(c.cursors()[0].page, 2);
}

#[tokio::test]
async fn reset_after_exhaustion_makes_sources_eligible_again() {
    let a = Arc::new(Scripted::new(Source::Behance, "a"));
    let rec = Arc::new(Recorder::default());
    let c = coordinator(vec![plan(&a, Some(1))], MergePolicy::Concatenate, &rec);

    c.fetch_next().await;
    assert!(c.is_exhausted());
    c.reset();
    assert!(!c.is_exhausted());
    assert!(c.is_empty());

    c.fetch_next().await;
    assert_eq!(a.calls(), [1, 1]);
    assert_eq!(rec.exhausted.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn merge_order_ignores_completion_order() {
    async fn run(delay_a: u64, delay_b: u64) -> Vec<String> {
        let a = Arc::new(Scripted::new(Source::Dribbble, "a").delayed(delay_a));
        let b = Arc::new(Scripted::new(Source::Behance, "b").delayed(delay_b));
        let rec = Arc::new(Recorder::default());
        let c = coordinator(vec![plan(&a, Some(2)), plan(&b, Some(2))], MergePolicy::RoundRobin, &rec);
        c.fetch_next().await;
        c.items().into_iter().map(|i| i.id).collect()
    }

    let a_slow = run(50, 0).await;
    let b_slow = run(0, 50).await;
    assert_eq!(a_slow, b_slow);
    assert_eq!(a_slow, ["a-p1-0", "b-p1-0", "a-p1-1", "b-p1-1"]);
}

#[tokio::test]
async fn sorted_rounds_never_reorder_earlier_items() {
    let a = Arc::new(Scripted::new(Source::Behance, "a"));
    let b = Arc::new(Scripted::new(Source::Dribbble, "b"));
    let rec = Arc::new(Recorder::default());
    let c = coordinator(vec![plan(&a, Some(2)), plan(&b, Some(2))], MergePolicy::SortedByKey, &rec);

    c.fetch_next().await;
    let first: Vec<String> = c.items().into_iter().map(|i| i.id).collect();
    assert_eq!(first, ["a-p1-0", "b-p1-0", "a-p1-1", "b-p1-1"]);

    // page 2 keys are larger, but they land after round one
    c.fetch_next().await;
    let all = c.items();
    assert_eq!(ids(&all[..4]), first.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(ids(&all[4..]), ["a-p2-0", "b-p2-0", "a-p2-1", "b-p2-1"]);
}

#[tokio::test]
async fn empty_page_exhausts_only_that_source() {
    let a = Arc::new(Scripted::new(Source::Dribbble, "a").empty_from(2));
    let b = Arc::new(Scripted::new(Source::Behance, "b"));
    let rec = Arc::new(Recorder::default());
    let c = coordinator(vec![plan(&a, None), plan(&b, Some(3))], MergePolicy::RoundRobin, &rec);

    c.fetch_next().await;
    c.fetch_next().await;
    c.fetch_next().await;
    assert_eq!(a.calls(), [1, 2]);
    assert_eq!(b.calls(), [1, 2, 3]);
    assert!(c.is_exhausted());
}

#[tokio::test]
async fn disabled_sources_are_never_called() {
    let a = Arc::new(Scripted::new(Source::Dribbble, "a"));
    let off = Arc::new(Scripted::new(Source::Behance, "off"));
    let rec = Arc::new(Recorder::default());
    let plans = vec![
        plan(&a, Some(1)),
        SourcePlan {
            adapter: off.clone(),
            params: PageParams::new(),
            tracker: PaginationTracker::disabled(),
        },
    ];
    let c = coordinator(plans, MergePolicy::RoundRobin, &rec);

    c.fetch_next().await;
    assert!(off.calls().is_empty());
    assert!(c.is_exhausted());
    assert_eq!(rec.exhausted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn listing_with_no_live_source_is_exhausted_on_first_call() {
    let rec = Arc::new(Recorder::default());
    let c = coordinator(Vec::new(), MergePolicy::Concatenate, &rec);
    assert_eq!(c.fetch_next().await, RoundOutcome::Exhausted);
    assert_eq!(rec.exhausted.load(Ordering::SeqCst), 1);
    assert!(rec.loading.lock().unwrap().is_empty());
}

#[tokio::test]
async fn panicking_adapter_counts_as_a_failed_source() {
    let a = Arc::new(Scripted::new(Source::Dribbble, "a"));
    let b = Arc::new(Scripted::new(Source::Behance, "b").panicking(1));
    let rec = Arc::new(Recorder::default());
    let c = coordinator(vec![plan(&a, Some(3)), plan(&b, Some(3))], MergePolicy::RoundRobin, &rec);

    let out = c.fetch_next().await;
    assert_eq!(
        out,
        RoundOutcome::Merged {
            added: 2,
            failed: vec![Source::Behance]
        }
    );
    assert_eq!(c.cursors()[1].page, 1);
    assert!(!c.cursors()[1].exhausted);

    assert!(matches!(c.fetch_next().await, RoundOutcome::Merged { added: 4, .. }));
    assert_eq!(b.calls(), [1, 1]);
    assert_eq!(c.cursors()[1].page, 2);
}

#[tokio::test(start_paused = true)]
async fn dropped_round_hands_the_listing_back() {
    let a = Arc::new(Scripted::new(Source::Dribbble, "a").delayed(200));
    let rec = Arc::new(Recorder::default());
    let c = coordinator(vec![plan(&a, Some(3))], MergePolicy::RoundRobin, &rec);

    // caller gives up while the adapter is still out
    let gave_up = tokio::time::timeout(Duration::from_millis(20), c.fetch_next()).await;
    assert!(gave_up.is_err());
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(c.phase(), Phase::Idle);
    assert_eq!(*rec.loading.lock().unwrap(), [true, false]);
    assert!(rec.increments.lock().unwrap().is_empty());
    assert_eq!(c.cursors()[0].page, 1);

    assert!(matches!(c.fetch_next().await, RoundOutcome::Merged { added: 2, .. }));
    assert_eq!(a.calls(), [1, 1]);
    assert_eq!(c.cursors()[0].page, 2);
}
