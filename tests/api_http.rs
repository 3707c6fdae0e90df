// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot, with every
// provider backed by a fixture transport.
//
// Covered:
// - GET /health
// - POST /api/listings/{kind}
// - GET /api/sessions/{id} (offset, q)
// - POST /api/sessions/{id}/next, /reset
// - DELETE /api/sessions/{id}
// - idle sweep and session cap

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use designerboard::api::spawn_session_sweeper;
use designerboard::config::settings::{PagingSettings, SessionSettings};
use designerboard::ingest::providers::behance::{BehanceJobs, BehanceProjects, DEFAULT_BASE};
use designerboard::ingest::providers::designer_news::{DesignerNewsJobs, DesignerNewsStories};
use designerboard::ingest::providers::dribbble::{DribbbleJobs, DribbbleShots, DEFAULT_SITE_BASE};
use designerboard::ingest::proxy::ScrapeProxy;
use designerboard::ingest::transport::Transport;
use designerboard::{router, AppState, ProviderSet};

const BODY_LIMIT: usize = 1024 * 1024;

fn proxy(body: &str) -> ScrapeProxy {
    ScrapeProxy::new("https://proxy.test/yql", Transport::fixture(body))
}

fn fixture_providers() -> ProviderSet {
    let dn = "https://news.layervault.com";
    ProviderSet {
        behance_projects: Arc::new(BehanceProjects::from_fixture(include_str!(
            "fixtures/behance_projects.json"
        ))),
        behance_jobs: Arc::new(BehanceJobs::new(
            DEFAULT_BASE,
            proxy(r#"{"query":{"count":0,"results":null}}"#),
        )),
        dribbble_shots: Arc::new(DribbbleShots::from_fixture(include_str!(
            "fixtures/dribbble_shots.json"
        ))),
        dribbble_jobs: Arc::new(DribbbleJobs::new(
            DEFAULT_SITE_BASE,
            proxy(include_str!("fixtures/dribbble_jobs.json")),
        )),
        designer_news_stories: Arc::new(DesignerNewsStories::new(
            dn,
            proxy(include_str!("fixtures/designer_news_stories.json")),
        )),
        designer_news_jobs: Arc::new(DesignerNewsJobs::new(
            dn,
            proxy(include_str!("fixtures/designer_news_jobs.json")),
        )),
    }
}

fn test_router() -> Router {
    router(AppState::new(fixture_providers(), PagingSettings::default()))
}

fn limited_state(idle_ttl_secs: u64, max_sessions: usize) -> AppState {
    AppState::new(fixture_providers(), PagingSettings::default()).with_session_limits(
        SessionSettings {
            idle_ttl_secs,
            sweep_secs: 10,
            max_sessions,
        },
    )
}

async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, Json) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, json)
}

async fn open(app: &Router, uri: &str) -> String {
    let (status, v) = call(app, "POST", uri).await;
    assert_eq!(status, StatusCode::CREATED, "open {uri}: {v}");
    v["id"].as_str().expect("session id").to_string()
}

/// Rounds run in the background; poll until the presenter has seen `rounds`.
async fn wait_rounds(app: &Router, id: &str, rounds: u64) -> Json {
    for _ in 0..200 {
        let (status, v) = call(app, "GET", &format!("/api/sessions/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        if v["rounds"].as_u64().unwrap_or(0) >= rounds && !v["loading"].as_bool().unwrap_or(true) {
            return v;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session {id} never reached {rounds} rounds");
}

fn ids(v: &Json) -> Vec<String> {
    v["items"]
        .as_array()
        .expect("items array")
        .iter()
        .map(|i| i["id"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let app = test_router();
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");
    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(String::from_utf8(bytes.to_vec()).unwrap(), "ok");
}

#[tokio::test]
async fn unknown_listing_and_session_are_404() {
    let app = test_router();
    let (status, _) = call(&app, "POST", "/api/listings/archive").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let ghost = "/api/sessions/00000000-0000-4000-8000-000000000000";
    for (method, uri) in [
        ("GET", ghost.to_string()),
        ("POST", format!("{ghost}/next")),
        ("POST", format!("{ghost}/reset")),
        ("DELETE", ghost.to_string()),
    ] {
        let (status, _) = call(&app, method, &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
    }
}

#[tokio::test]
async fn jobs_listing_merges_boards_and_filters_by_query() {
    let app = test_router();
    let id = open(&app, "/api/listings/jobs").await;

    let v = wait_rounds(&app, &id, 1).await;
    assert_eq!(v["view"]["section"], "jobs");
    assert_eq!(v["view"]["large_images"], false);
    assert_eq!(v["exhausted"], true);
    assert_eq!(v["phase"], "all_exhausted");
    assert_eq!(
        ids(&v),
        [
            "dribbble-job-2201-acme",
            "dn-job-httpsjobsexamplecomlisting311uxhtml",
            "dribbble-job-2202-brightside"
        ]
    );
    // behance jobs are off by default and never leave page 1
    let cursors = v["cursors"].as_array().unwrap();
    assert_eq!(cursors.len(), 3);
    assert_eq!(cursors[2]["source"], "behance");
    assert_eq!(cursors[2]["page"], 1);

    let (_, filtered) = call(&app, "GET", &format!("/api/sessions/{id}?q=remote")).await;
    assert_eq!(ids(&filtered), ["dribbble-job-2202-brightside"]);

    let (_, tail) = call(&app, "GET", &format!("/api/sessions/{id}?offset=2")).await;
    assert_eq!(ids(&tail), ["dribbble-job-2202-brightside"]);
    assert_eq!(tail["total"], 3);

    let (status, next) = call(&app, "POST", &format!("/api/sessions/{id}/next?wait=true")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(next["outcome"], "exhausted");
}

#[tokio::test]
async fn popular_listing_alternates_dribbble_then_behance() {
    let app = test_router();
    let id = open(&app, "/api/listings/popular?large_images=false").await;

    let v = wait_rounds(&app, &id, 1).await;
    assert_eq!(v["view"]["large_images"], false);
    assert_eq!(
        ids(&v),
        ["dribbble-1050001", "behance-9812", "dribbble-1050002", "behance-9813"]
    );
    // a short dribbble page ends that source; behance carries on
    let cursors = v["cursors"].as_array().unwrap();
    assert_eq!(cursors[0]["exhausted"], true);
    assert_eq!(cursors[1]["exhausted"], false);
    assert_eq!(cursors[1]["page"], 2);

    // behance has no fixture for page 2: the round fails and keeps the page
    let (_, next) = call(&app, "POST", &format!("/api/sessions/{id}/next?wait=true")).await;
    assert_eq!(next["outcome"], "merged");
    assert_eq!(next["added"], 0);
    assert_eq!(next["cursors"][1]["page"], 2);
}

#[tokio::test]
async fn reset_refetches_from_page_one() {
    let app = test_router();
    let id = open(&app, "/api/listings/jobs").await;
    wait_rounds(&app, &id, 1).await;

    let (status, v) = call(&app, "POST", &format!("/api/sessions/{id}/reset")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(v["exhausted"], false);

    let v = wait_rounds(&app, &id, 2).await;
    assert_eq!(v["total"], 3);
    assert_eq!(v["exhausted"], true);
}

#[tokio::test]
async fn deleted_session_is_gone() {
    let app = test_router();
    let id = open(&app, "/api/listings/news").await;

    let (status, _) = call(&app, "DELETE", &format!("/api/sessions/{id}")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "GET", &format!("/api/sessions/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(start_paused = true)]
async fn idle_sessions_are_swept() {
    let state = limited_state(60, 100);
    let app = router(state.clone());

    let stale = open(&app, "/api/listings/jobs").await;
    wait_rounds(&app, &stale, 1).await;
    tokio::time::advance(Duration::from_secs(40)).await;
    let fresh = open(&app, "/api/listings/jobs").await;
    wait_rounds(&app, &fresh, 1).await;
    tokio::time::advance(Duration::from_secs(30)).await;

    assert_eq!(state.sweep_idle(), 1);
    assert_eq!(state.session_count(), 1);
    let (status, _) = call(&app, "GET", &format!("/api/sessions/{stale}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&app, "GET", &format!("/api/sessions/{fresh}")).await;
    assert_eq!(status, StatusCode::OK);

    // the background sweeper picks up the rest once it goes quiet
    let sweeper = spawn_session_sweeper(state.clone());
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(state.session_count(), 0);
    let (status, _) = call(&app, "GET", &format!("/api/sessions/{fresh}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    sweeper.abort();
}

#[tokio::test(start_paused = true)]
async fn session_cap_evicts_least_recently_used() {
    let state = limited_state(900, 2);
    let app = router(state.clone());

    let first = open(&app, "/api/listings/news").await;
    tokio::time::advance(Duration::from_secs(1)).await;
    let second = open(&app, "/api/listings/news").await;
    tokio::time::advance(Duration::from_secs(1)).await;
    // reading the first session makes the second one the oldest
    let (status, _) = call(&app, "GET", &format!("/api/sessions/{first}")).await;
    assert_eq!(status, StatusCode::OK);
    tokio::time::advance(Duration::from_secs(1)).await;
    let third = open(&app, "/api/listings/news").await;

    assert_eq!(state.session_count(), 2);
    let (status, _) = call(&app, "GET", &format!("/api/sessions/{second}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    for id in [&first, &third] {
        let (status, _) = call(&app, "GET", &format!("/api/sessions/{id}")).await;
        assert_eq!(status, StatusCode::OK, "{id}");
    }
}
