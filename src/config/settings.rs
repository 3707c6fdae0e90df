// src/config/settings.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

use crate::ingest::providers::{behance, designer_news, dribbble};
use crate::ingest::proxy::DEFAULT_SCRAPE_PROXY;
use crate::pagination::DEFAULT_SAFETY_CAP;

pub const ENV_CONFIG_PATH: &str = "DESIGNERBOARD_CONFIG";
pub const ENV_BEHANCE_API_KEY: &str = "BEHANCE_API_KEY";

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_safety_cap() -> u32 {
    DEFAULT_SAFETY_CAP
}
fn default_per_page() -> usize {
    20
}
fn default_idle_ttl_secs() -> u64 {
    900
}
fn default_sweep_secs() -> u64 {
    60
}
fn default_max_sessions() -> usize {
    1000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub upstream: UpstreamSettings,
    #[serde(default)]
    pub paging: PagingSettings,
    #[serde(default)]
    pub sessions: SessionSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamSettings {
    pub behance_base: String,
    pub dribbble_api_base: String,
    pub dribbble_site_base: String,
    pub designer_news_base: String,
    pub scrape_proxy: String,
    /// "ENV" means: read from BEHANCE_API_KEY
    pub behance_api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingSettings {
    /// Upper page bound for sources that never report their last page.
    pub safety_cap: u32,
    pub per_page: usize,
    /// Include the Behance job board in the jobs listing.
    pub behance_jobs: bool,
}

/// Bounds on the live listing sessions the API keeps in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Sessions untouched for longer than this are swept.
    pub idle_ttl_secs: u64,
    pub sweep_secs: u64,
    pub max_sessions: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_ttl_secs: default_idle_ttl_secs(),
            sweep_secs: default_sweep_secs(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            upstream: UpstreamSettings::default(),
            paging: PagingSettings::default(),
            sessions: SessionSettings::default(),
        }
    }
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            behance_base: behance::DEFAULT_BASE.to_string(),
            dribbble_api_base: dribbble::DEFAULT_API_BASE.to_string(),
            dribbble_site_base: dribbble::DEFAULT_SITE_BASE.to_string(),
            designer_news_base: designer_news::DEFAULT_BASE.to_string(),
            scrape_proxy: DEFAULT_SCRAPE_PROXY.to_string(),
            behance_api_key: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for PagingSettings {
    fn default() -> Self {
        Self {
            safety_cap: default_safety_cap(),
            per_page: default_per_page(),
            behance_jobs: false,
        }
    }
}

impl Settings {
    /// Load settings from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let parsed = match ext.as_str() {
            "json" => serde_json::from_str::<Settings>(&content)
                .with_context(|| format!("parsing {}", path.display()))?,
            "toml" => toml::from_str::<Settings>(&content)
                .with_context(|| format!("parsing {}", path.display()))?,
            other => bail!("unsupported settings format: {other:?}"),
        };
        parsed.finish()
    }

    /// Load settings using env var + fallbacks:
    /// 1) $DESIGNERBOARD_CONFIG
    /// 2) config/designerboard.toml
    /// 3) config/designerboard.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            } else {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
        }
        let toml_p = PathBuf::from("config/designerboard.toml");
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        let json_p = PathBuf::from("config/designerboard.json");
        if json_p.exists() {
            return Self::load_from(&json_p);
        }
        Settings::default().finish()
    }

    /// Resolve the API key and clamp values that would break paging.
    fn finish(mut self) -> Result<Self> {
        if self.upstream.behance_api_key.trim().eq_ignore_ascii_case("env") {
            self.upstream.behance_api_key = env::var(ENV_BEHANCE_API_KEY)
                .map_err(|_| anyhow!("Missing {ENV_BEHANCE_API_KEY} env var"))?;
        }
        if self.paging.safety_cap == 0 {
            self.paging.safety_cap = default_safety_cap();
        }
        if self.paging.per_page == 0 {
            self.paging.per_page = default_per_page();
        }
        if self.upstream.timeout_secs == 0 {
            self.upstream.timeout_secs = default_timeout_secs();
        }
        if self.sessions.idle_ttl_secs == 0 {
            self.sessions.idle_ttl_secs = default_idle_ttl_secs();
        }
        if self.sessions.sweep_secs == 0 {
            self.sessions.sweep_secs = default_sweep_secs();
        }
        if self.sessions.max_sessions == 0 {
            self.sessions.max_sessions = default_max_sessions();
        }
        Ok(self)
    }
}
