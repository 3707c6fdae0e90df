//! designerboard: binary entrypoint
//! Loads settings, wires the upstream adapters and serves the listing API.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use designerboard::metrics::Metrics;
use designerboard::api::spawn_session_sweeper;
use designerboard::{router, AppState, ProviderSet, Settings};

/// LOG_FORMAT=json switches to structured output; RUST_LOG overrides the filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("designerboard=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; missing file is fine
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = Settings::load_default().context("loading settings")?;
    let providers = ProviderSet::from_settings(&settings)?;
    let metrics = Metrics::init(settings.paging.safety_cap)?;

    let state = AppState::new(providers, settings.paging.clone())
        .with_session_limits(settings.sessions.clone());
    spawn_session_sweeper(state.clone());
    let app = router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&settings.bind)
        .await
        .with_context(|| format!("binding {}", settings.bind))?;
    tracing::info!(bind = %settings.bind, "designerboard listening");
    if settings.upstream.behance_api_key.is_empty() {
        tracing::warn!("no Behance API key configured; Behance requests will be rejected upstream");
    }

    axum::serve(listener, app).await.context("http server")?;
    Ok(())
}
